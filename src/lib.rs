//! GraphQA
//!
//! Natural language question answering over a Cypher graph store.
//!
//! A question flows through four stages, each a separate network call:
//!
//! - schema introspection against the store
//! - Cypher synthesis by a language model, constrained by that schema
//! - execution of the statement and normalization of every record to JSON
//! - answer composition by the language model from the normalized records
//!
//! Both Bolt (`bolt://`, `neo4j://`) and the HTTP transactional API
//! (`http://`, `https://`) are supported as transports.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use graphqa::{AppConfig, AskOptions, NLQPipeline};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = AppConfig::from_yaml_file("graphqa.yaml")?;
//! config.apply_env();
//!
//! let pipeline = NLQPipeline::from_config(&config)?;
//! pipeline.connect().await?;
//!
//! let result = pipeline
//!     .ask("Which state has the most returns?", AskOptions::default())
//!     .await?;
//! println!("{}", result.answer);
//! # Ok(())
//! # }
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod embed;
pub mod graph;
pub mod http;
pub mod nlq;

// Re-export main types for convenience
pub use config::{AppConfig, ConfigError, ConnectionConfig, LLMProvider, LlmConfig, ServerConfig};

pub use embed::{EmbedError, Embedder, EmbeddingClient};

pub use graph::{
    GraphDriver, GraphError, GraphResult, GraphRow, GraphSession, GraphValue, QueryRecord,
};

pub use http::HttpServer;

pub use nlq::{
    AskOptions, ChatMessage, ChatModel, LLMClient, NLQError, NLQPipeline, NLQResult, QaAnswer,
    SchemaDescription, SearchHit,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
