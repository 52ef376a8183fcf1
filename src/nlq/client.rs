//! Chat completion client for LLM providers

use crate::config::{LLMProvider, LlmConfig};
use crate::nlq::{NLQError, NLQResult};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Speaker role in a chat conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// A language model producing chat completions.
///
/// Implementations return an empty string when the model produced no content.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> NLQResult<String>;
}

/// HTTP client for the configured provider
pub struct LLMClient {
    client: Client,
    config: LlmConfig,
    api_base_url: String,
}

impl LLMClient {
    pub fn new(config: &LlmConfig) -> NLQResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NLQError::Config(e.to_string()))?;

        Ok(Self {
            client,
            config: config.clone(),
            api_base_url: config.base_url(),
        })
    }

    pub fn provider(&self) -> LLMProvider {
        self.config.provider
    }

    fn api_key(&self) -> NLQResult<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| NLQError::Config(format!("{:?} requires API key", self.config.provider)))
    }

    async fn openai_chat(&self, messages: &[ChatMessage], temperature: f32) -> NLQResult<String> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            messages: &'a [ChatMessage],
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct Response {
            #[serde(default)]
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: MessageContent,
        }

        #[derive(Deserialize)]
        struct MessageContent {
            content: Option<String>,
        }

        let api_key = self.api_key()?;
        let url = format!("{}/chat/completions", self.api_base_url);
        let resp = self.client.post(&url)
            .bearer_auth(api_key)
            .json(&Request {
                model: &self.config.model,
                messages,
                temperature,
            })
            .send()
            .await
            .map_err(|e| NLQError::Network(e.to_string()))?;

        let result: Response = decode(resp, "OpenAI").await?;
        Ok(result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn ollama_chat(&self, messages: &[ChatMessage], temperature: f32) -> NLQResult<String> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            messages: &'a [ChatMessage],
            stream: bool,
            options: Options,
        }

        #[derive(Serialize)]
        struct Options {
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct Response {
            message: Option<ChatMessage>,
        }

        let url = format!("{}/api/chat", self.api_base_url);
        let resp = self.client.post(&url)
            .json(&Request {
                model: &self.config.model,
                messages,
                stream: false,
                options: Options { temperature },
            })
            .send()
            .await
            .map_err(|e| NLQError::Network(e.to_string()))?;

        let result: Response = decode(resp, "Ollama").await?;
        Ok(result.message.map(|m| m.content).unwrap_or_default())
    }

    async fn gemini_chat(&self, messages: &[ChatMessage], temperature: f32) -> NLQResult<String> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Request {
            #[serde(skip_serializing_if = "Option::is_none")]
            system_instruction: Option<Content>,
            contents: Vec<Content>,
            generation_config: GenerationConfig,
        }

        #[derive(Serialize, Deserialize)]
        struct Content {
            #[serde(default, skip_serializing_if = "Option::is_none")]
            role: Option<String>,
            #[serde(default)]
            parts: Vec<Part>,
        }

        #[derive(Serialize, Deserialize)]
        struct Part {
            #[serde(default)]
            text: String,
        }

        #[derive(Serialize)]
        struct GenerationConfig {
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct Response {
            candidates: Option<Vec<Candidate>>,
        }

        #[derive(Deserialize)]
        struct Candidate {
            content: Option<Content>,
        }

        let api_key = self.api_key()?;

        // Gemini takes system text separately and calls the assistant "model"
        let system_text: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let system_instruction = (!system_text.is_empty()).then(|| Content {
            role: None,
            parts: vec![Part { text: system_text.join("\n\n") }],
        });
        let contents = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| Content {
                role: Some(if m.role == Role::Assistant { "model" } else { "user" }.to_string()),
                parts: vec![Part { text: m.content.clone() }],
            })
            .collect();

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base_url, self.config.model, api_key
        );
        let resp = self.client.post(&url)
            .json(&Request {
                system_instruction,
                contents,
                generation_config: GenerationConfig { temperature },
            })
            .send()
            .await
            .map_err(|e| NLQError::Network(e.to_string()))?;

        let result: Response = decode(resp, "Gemini").await?;
        let text = result
            .candidates
            .and_then(|candidates| candidates.into_iter().next())
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        Ok(text)
    }
}

#[async_trait]
impl ChatModel for LLMClient {
    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> NLQResult<String> {
        debug!(provider = ?self.config.provider, messages = messages.len(), "Requesting chat completion");
        match self.config.provider {
            LLMProvider::OpenAI => self.openai_chat(messages, temperature).await,
            LLMProvider::Ollama => self.ollama_chat(messages, temperature).await,
            LLMProvider::Gemini => self.gemini_chat(messages, temperature).await,
        }
    }
}

async fn decode<T: DeserializeOwned>(resp: Response, provider: &str) -> NLQResult<T> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(NLQError::Api(format!("{} error {}: {}", provider, status, text)));
    }
    resp.json()
        .await
        .map_err(|e| NLQError::Serialization(e.to_string()))
}
