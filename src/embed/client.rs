//! Embedding client for various LLM providers

use crate::config::{LLMProvider, LlmConfig};
use crate::embed::{EmbedError, EmbedResult, Embedder};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client for interacting with LLM APIs to generate embeddings
pub struct EmbeddingClient {
    client: Client,
    provider: LLMProvider,
    model: String,
    api_key: Option<String>,
    api_base_url: String,
}

impl EmbeddingClient {
    /// Create a new embedding client from the LLM configuration
    pub fn new(config: &LlmConfig) -> EmbedResult<Self> {
        let model = config
            .embedding_model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| EmbedError::Config("llm.embedding_model is not set".to_string()))?;

        if config.provider.requires_api_key() && config.api_key.is_none() {
            return Err(EmbedError::Config(format!(
                "{:?} requires API key",
                config.provider
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbedError::Config(e.to_string()))?;

        Ok(Self {
            client,
            provider: config.provider,
            model,
            api_key: config.api_key.clone(),
            api_base_url: config.base_url(),
        })
    }

    fn api_key(&self) -> EmbedResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| EmbedError::Config(format!("{:?} requires API key", self.provider)))
    }

    async fn openai_embedding(&self, text: &str) -> EmbedResult<Vec<f32>> {
        #[derive(Serialize)]
        struct OpenAIRequest<'a> {
            input: &'a str,
            model: &'a str,
        }

        #[derive(Deserialize)]
        struct OpenAIResponse {
            data: Vec<OpenAIData>,
        }

        #[derive(Deserialize)]
        struct OpenAIData {
            embedding: Vec<f32>,
        }

        let url = format!("{}/embeddings", self.api_base_url);
        let resp = self.client.post(&url)
            .bearer_auth(self.api_key()?)
            .json(&OpenAIRequest {
                input: text,
                model: &self.model,
            })
            .send()
            .await
            .map_err(|e| EmbedError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(EmbedError::Api(format!("OpenAI returned error: {}", error_text)));
        }

        let result: OpenAIResponse = resp.json().await.map_err(|e| EmbedError::Serialization(e.to_string()))?;
        result
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbedError::Serialization("OpenAI returned no embedding".to_string()))
    }

    async fn ollama_embedding(&self, text: &str) -> EmbedResult<Vec<f32>> {
        #[derive(Serialize)]
        struct OllamaRequest<'a> {
            model: &'a str,
            prompt: &'a str,
        }

        #[derive(Deserialize)]
        struct OllamaResponse {
            embedding: Vec<f32>,
        }

        let url = format!("{}/api/embeddings", self.api_base_url);
        let resp = self.client.post(&url)
            .json(&OllamaRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| EmbedError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(EmbedError::Api(format!("Ollama returned error: {}", error_text)));
        }

        let result: OllamaResponse = resp.json().await.map_err(|e| EmbedError::Serialization(e.to_string()))?;
        Ok(result.embedding)
    }

    async fn gemini_embedding(&self, text: &str) -> EmbedResult<Vec<f32>> {
        #[derive(Serialize)]
        struct GeminiRequest<'a> {
            model: String,
            content: GeminiContent<'a>,
        }

        #[derive(Serialize)]
        struct GeminiContent<'a> {
            parts: Vec<GeminiPart<'a>>,
        }

        #[derive(Serialize)]
        struct GeminiPart<'a> {
            text: &'a str,
        }

        #[derive(Deserialize)]
        struct GeminiResponse {
            embedding: GeminiEmbedding,
        }

        #[derive(Deserialize)]
        struct GeminiEmbedding {
            values: Vec<f32>,
        }

        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.api_base_url,
            self.model,
            self.api_key()?
        );

        let resp = self.client.post(&url)
            .json(&GeminiRequest {
                model: format!("models/{}", self.model),
                content: GeminiContent {
                    parts: vec![GeminiPart { text }],
                },
            })
            .send()
            .await
            .map_err(|e| EmbedError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(EmbedError::Api(format!("Gemini returned error: {}", error_text)));
        }

        let result: GeminiResponse = resp.json().await.map_err(|e| EmbedError::Serialization(e.to_string()))?;
        Ok(result.embedding.values)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> EmbedResult<Vec<f32>> {
        match self.provider {
            LLMProvider::OpenAI => self.openai_embedding(text).await,
            LLMProvider::Ollama => self.ollama_embedding(text).await,
            LLMProvider::Gemini => self.gemini_embedding(text).await,
        }
    }
}
