//! Natural Language Querying (NLQ)
//!
//! Answers free-text questions from a graph store in four sequential stages:
//!
//! 1. introspect the store schema ([`schema::introspect`])
//! 2. ask the model for a Cypher statement constrained by that schema
//! 3. run the statement and normalize the records to plain JSON
//! 4. ask the model to phrase an answer from the records
//!
//! Any stage failing fails the whole call. Nothing is cached and nothing is
//! retried.

pub mod client;
pub mod prompt;
pub mod schema;
pub mod search;

pub use client::{ChatMessage, ChatModel, LLMClient, Role};
pub use prompt::PromptTemplate;
pub use schema::{SchemaDescription, SchemaEntry, SchemaKind};
pub use search::SearchHit;

use crate::config::{AppConfig, ConfigError, ConnectionConfig};
use crate::embed::{EmbedError, Embedder, EmbeddingClient};
use crate::graph::{self, finish_session, run_in_session, GraphDriver, GraphError, Params, QueryRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum NLQError {
    #[error("Graph store is not connected; call connect() first")]
    NotConnected,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("LLM API error: {0}")]
    Api(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Template error: {0}")]
    Template(String),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Embed(#[from] EmbedError),
}

impl From<ConfigError> for NLQError {
    fn from(e: ConfigError) -> Self {
        NLQError::Config(e.to_string())
    }
}

pub type NLQResult<T> = Result<T, NLQError>;

/// Sampling temperature for both model calls
const TEMPERATURE: f32 = 0.0;

/// Options for [`NLQPipeline::ask`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AskOptions {
    /// Accepted for API compatibility. Answers are never cached, so this has
    /// no effect.
    pub skip_cache: bool,
    /// Return the synthesized statement and the normalized records too
    pub include_raw_results: bool,
}

/// Result of [`NLQPipeline::ask`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaAnswer {
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cypher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_results: Option<Vec<QueryRecord>>,
}

/// Question answering pipeline over one graph store.
///
/// The pipeline owns its driver handle. It starts unconnected; [`connect`]
/// or [`attach_driver`] make it usable and [`disconnect`] drops the handle.
/// Each unit of work runs in its own session, so overlapping calls on a shared
/// pipeline do not interfere.
///
/// [`connect`]: NLQPipeline::connect
/// [`attach_driver`]: NLQPipeline::attach_driver
/// [`disconnect`]: NLQPipeline::disconnect
pub struct NLQPipeline {
    connection: ConnectionConfig,
    model: Arc<dyn ChatModel>,
    embedder: Option<Arc<dyn Embedder>>,
    driver: RwLock<Option<Arc<dyn GraphDriver>>>,
    cypher_template: PromptTemplate,
    answer_template: PromptTemplate,
}

impl NLQPipeline {
    /// Create an unconnected pipeline; fails on invalid settings or an
    /// unsupported URL scheme
    pub fn new(connection: ConnectionConfig, model: Arc<dyn ChatModel>) -> NLQResult<Self> {
        connection.validate()?;
        graph::Transport::from_url(&connection.url)?;
        Ok(Self {
            connection,
            model,
            embedder: None,
            driver: RwLock::new(None),
            cypher_template: PromptTemplate::parse(prompt::CYPHER_GENERATION_TEMPLATE),
            answer_template: PromptTemplate::parse(prompt::ANSWER_TEMPLATE),
        })
    }

    /// Build a pipeline with HTTP model clients from application config.
    ///
    /// An embedding client is attached when `llm.embedding_model` is set.
    pub fn from_config(config: &AppConfig) -> NLQResult<Self> {
        config.validate()?;
        let model = Arc::new(LLMClient::new(&config.llm)?);
        let mut pipeline = Self::new(config.graph.clone(), model)?;
        if config.llm.embedding_model.is_some() {
            pipeline = pipeline.with_embedder(Arc::new(EmbeddingClient::new(&config.llm)?));
        }
        Ok(pipeline)
    }

    /// Enable [`similarity_search`](NLQPipeline::similarity_search)
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn connection(&self) -> &ConnectionConfig {
        &self.connection
    }

    /// Open a driver for the configured URL, reusing an existing one
    pub async fn connect(&self) -> NLQResult<()> {
        let mut guard = self.driver.write().await;
        if guard.is_none() {
            let driver = graph::connect(&self.connection).await?;
            *guard = Some(driver);
            info!(url = %self.connection.url, "Pipeline connected");
        }
        Ok(())
    }

    /// Use a caller-supplied driver, replacing any existing handle
    pub async fn attach_driver(&self, driver: Arc<dyn GraphDriver>) {
        *self.driver.write().await = Some(driver);
    }

    /// Drop the driver handle
    pub async fn disconnect(&self) {
        if self.driver.write().await.take().is_some() {
            info!("Pipeline disconnected");
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.driver.read().await.is_some()
    }

    pub(crate) async fn driver(&self) -> NLQResult<Arc<dyn GraphDriver>> {
        self.driver
            .read()
            .await
            .as_ref()
            .map(Arc::clone)
            .ok_or(NLQError::NotConnected)
    }

    /// Introspect the current schema in a dedicated session
    pub async fn schema(&self) -> NLQResult<SchemaDescription> {
        let driver = self.driver().await?;
        introspect_with(&*driver).await
    }

    /// Answer `question` from the graph store
    pub async fn ask(&self, question: &str, options: AskOptions) -> NLQResult<QaAnswer> {
        let driver = self.driver().await?;
        if options.skip_cache {
            debug!("skip_cache requested; answers are never cached");
        }

        let schema = introspect_with(&*driver).await?;
        debug!(entries = schema.entries.len(), "Schema introspected");

        let cypher = self.synthesize_cypher(&schema.to_string(), question).await?;
        debug!(cypher = %cypher, "Cypher synthesized");

        let records = self.execute_with(&*driver, &cypher).await?;
        debug!(records = records.len(), "Statement executed");

        let answer = self.compose_answer(question, &records).await?;

        if options.include_raw_results {
            Ok(QaAnswer {
                answer,
                cypher: Some(cypher),
                raw_results: Some(records),
            })
        } else {
            Ok(QaAnswer {
                answer,
                cypher: None,
                raw_results: None,
            })
        }
    }

    /// Ask the model for a Cypher statement answering `question`
    pub async fn synthesize_cypher(&self, schema: &str, question: &str) -> NLQResult<String> {
        let instruction = self.cypher_template.render(&[
            ("schema", schema),
            ("question", question),
            ("embedding_property", self.connection.embedding_node_property.as_str()),
        ])?;
        let messages = [ChatMessage::system(instruction), ChatMessage::user(question)];
        let reply = self.model.complete(&messages, TEMPERATURE).await?;
        Ok(extract_statement(&reply))
    }

    /// Run `cypher` and normalize the resulting rows
    pub async fn execute(&self, cypher: &str) -> NLQResult<Vec<QueryRecord>> {
        let driver = self.driver().await?;
        self.execute_with(&*driver, cypher).await
    }

    async fn execute_with(
        &self,
        driver: &dyn GraphDriver,
        cypher: &str,
    ) -> NLQResult<Vec<QueryRecord>> {
        let rows = run_in_session(driver, cypher, &Params::new()).await?;
        Ok(rows.iter().map(graph::value::normalize_row).collect())
    }

    /// Ask the model to phrase an answer from `records`
    pub async fn compose_answer(&self, question: &str, records: &[QueryRecord]) -> NLQResult<String> {
        let context = serde_json::to_string(records)
            .map_err(|e| NLQError::Serialization(e.to_string()))?;
        let instruction = self
            .answer_template
            .render(&[("context", context.as_str()), ("question", question)])?;
        let messages = [ChatMessage::system(instruction), ChatMessage::user(question)];
        self.model.complete(&messages, TEMPERATURE).await
    }
}

async fn introspect_with(driver: &dyn GraphDriver) -> NLQResult<SchemaDescription> {
    let mut session = driver.open_session().await?;
    let outcome = schema::introspect(session.as_mut()).await;
    Ok(finish_session(session, outcome).await?)
}

/// Strip a markdown code fence from a model reply.
///
/// Text before the opening fence is dropped, as is a language tag on the
/// fence line. A missing closing fence keeps everything after the opening one.
/// The statement itself is not validated; malformed Cypher fails when run.
pub fn extract_statement(response: &str) -> String {
    let trimmed = response.trim();

    let Some(start) = trimmed.find("```") else {
        return trimmed.to_string();
    };
    let body = skip_language_tag(&trimmed[start + 3..]);
    let body = match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim().to_string()
}

/// Drop a language tag directly after an opening fence
fn skip_language_tag(after_fence: &str) -> &str {
    let tag_len = after_fence
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '+'))
        .unwrap_or(after_fence.len());
    let (tag, rest) = after_fence.split_at(tag_len);

    if tag.is_empty() {
        return after_fence;
    }
    // A lone word on the fence line is a tag; on the same line as code only
    // "cypher" is
    let line_ends = rest.is_empty() || rest.starts_with('\n') || rest.starts_with("\r\n");
    if line_ends || tag.eq_ignore_ascii_case("cypher") {
        rest
    } else {
        after_fence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_statement_from_fence() {
        let reply = "Here you go:\n```cypher\nMATCH (n:State) RETURN n.STATE\n```\nEnjoy";
        assert_eq!(extract_statement(reply), "MATCH (n:State) RETURN n.STATE");
    }

    #[test]
    fn test_extract_statement_plain() {
        assert_eq!(extract_statement("  MATCH (n) RETURN n  \n"), "MATCH (n) RETURN n");
        assert_eq!(extract_statement(""), "");
    }

    #[test]
    fn test_extract_statement_unterminated_fence() {
        assert_eq!(extract_statement("```cypher\nMATCH (n) RETURN n"), "MATCH (n) RETURN n");
        assert_eq!(
            extract_statement("Here is the query:\n```cypher\nMATCH (n) RETURN n"),
            "MATCH (n) RETURN n"
        );
    }

    #[test]
    fn test_extract_statement_tag_on_fence_line() {
        assert_eq!(extract_statement("```cypher MATCH (n) RETURN n```"), "MATCH (n) RETURN n");
        assert_eq!(extract_statement("```CYPHER\tMATCH (n) RETURN n\n```"), "MATCH (n) RETURN n");
    }

    #[test]
    fn test_extract_statement_untagged_inline_fence() {
        assert_eq!(extract_statement("```MATCH (n) RETURN n```"), "MATCH (n) RETURN n");
        assert_eq!(extract_statement("```\nMATCH (n) RETURN n\n```"), "MATCH (n) RETURN n");
    }

    #[test]
    fn test_answer_serializes_only_answer_by_default() {
        let answer = QaAnswer {
            answer: "CA".to_string(),
            cypher: None,
            raw_results: None,
        };
        assert_eq!(serde_json::to_value(&answer).unwrap(), json!({"answer": "CA"}));
    }

    #[test]
    fn test_answer_serializes_raw_results_camel_case() {
        let mut record = QueryRecord::new();
        record.insert("STATE".to_string(), json!("CA"));
        let answer = QaAnswer {
            answer: "CA".to_string(),
            cypher: Some("MATCH (n) RETURN n.STATE AS STATE".to_string()),
            raw_results: Some(vec![record]),
        };
        let value = serde_json::to_value(&answer).unwrap();
        assert_eq!(value["rawResults"], json!([{"STATE": "CA"}]));
        assert_eq!(value["cypher"], json!("MATCH (n) RETURN n.STATE AS STATE"));
    }

    #[test]
    fn test_ask_options_from_json_defaults() {
        let options: AskOptions = serde_json::from_str(r#"{"includeRawResults": true}"#).unwrap();
        assert!(options.include_raw_results);
        assert!(!options.skip_cache);
        assert_eq!(serde_json::from_str::<AskOptions>("{}").unwrap(), AskOptions::default());
    }
}
