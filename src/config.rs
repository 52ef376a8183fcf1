//! Configuration for the question answering pipeline
//!
//! Configuration is loaded from YAML. The graph connection block accepts both
//! snake_case and camelCase keys so existing front-end configs can be reused.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Environment variable overriding `llm.api_key`
pub const API_KEY_ENV: &str = "GRAPHQA_API_KEY";
/// Environment variable overriding `graph.password`
pub const GRAPH_PASSWORD_ENV: &str = "GRAPHQA_GRAPH_PASSWORD";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Graph store connection settings.
///
/// Every field except `database` is required; there are no defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Store endpoint (`bolt://`, `neo4j://`, `neo4j+s://`, `http://`, ...)
    pub url: String,
    pub username: String,
    pub password: String,
    /// Database name, the server default is used when unset
    #[serde(default)]
    pub database: Option<String>,
    /// Vector index used by similarity search
    #[serde(alias = "indexName")]
    pub index_name: String,
    #[serde(alias = "nodeLabel")]
    pub node_label: String,
    #[serde(alias = "textNodeProperties")]
    pub text_node_properties: Vec<String>,
    /// Property holding node embeddings; never referenced by generated queries
    #[serde(alias = "embeddingNodeProperty")]
    pub embedding_node_property: String,
    /// Request timeout in seconds for the HTTP transport
    #[serde(default = "default_timeout_secs", alias = "timeoutSecs")]
    pub timeout_secs: u64,
}

impl ConnectionConfig {
    /// Check that every required setting is present
    pub fn validate(&self) -> ConfigResult<()> {
        let required = [
            ("graph.url", &self.url),
            ("graph.username", &self.username),
            ("graph.password", &self.password),
            ("graph.index_name", &self.index_name),
            ("graph.node_label", &self.node_label),
            ("graph.embedding_node_property", &self.embedding_node_property),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(name));
            }
        }

        if self.text_node_properties.is_empty() {
            return Err(ConfigError::Missing("graph.text_node_properties"));
        }
        if self.text_node_properties.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "graph.text_node_properties contains an empty name".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("graph.timeout_secs must be positive".to_string()));
        }
        if !self.url.contains("://") {
            return Err(ConfigError::Invalid(format!(
                "graph.url has no scheme: {}",
                self.url
            )));
        }

        Ok(())
    }
}

/// Language model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LLMProvider {
    OpenAI,
    Ollama,
    Gemini,
}

impl LLMProvider {
    /// Default API base URL for the provider
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LLMProvider::OpenAI => "https://api.openai.com/v1",
            LLMProvider::Ollama => "http://localhost:11434",
            LLMProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    /// Whether requests must carry an API key
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, LLMProvider::Ollama)
    }
}

fn default_timeout_secs() -> u64 {
    60
}

/// Language model settings shared by the chat and embedding clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LLMProvider,
    /// Chat model name (e.g. "gpt-4o", "llama3")
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Overrides the provider's default base URL
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Embedding model, required for similarity search
    #[serde(default)]
    pub embedding_model: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// Base URL without a trailing slash
    pub fn base_url(&self) -> String {
        self.api_base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Missing("llm.model"));
        }
        if self.provider.requires_api_key()
            && self.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "{:?} requires llm.api_key",
                self.provider
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("llm.timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}

/// HTTP API server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
}

impl ServerConfig {
    fn default_host() -> String {
        "127.0.0.1".to_string()
    }

    fn default_port() -> u16 {
        8080
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub graph: ConnectionConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl AppConfig {
    /// Parse configuration from a YAML document
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a YAML configuration file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Apply secret overrides from the environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(API_KEY_ENV).ok(),
            std::env::var(GRAPH_PASSWORD_ENV).ok(),
        );
    }

    fn apply_overrides(&mut self, api_key: Option<String>, password: Option<String>) {
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            self.llm.api_key = Some(key);
        }
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            self.graph.password = password;
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.graph.validate()?;
        self.llm.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
graph:
  url: bolt://localhost:7687
  username: neo4j
  password: secret
  indexName: returns_index
  nodeLabel: Return
  textNodeProperties: [STATE, No_of_return]
  embeddingNodeProperty: embedding
llm:
  provider: OpenAI
  model: gpt-4o
  api_key: sk-test
"#;

    #[test]
    fn test_parse_camel_case_connection_block() {
        let config = AppConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.graph.index_name, "returns_index");
        assert_eq!(config.graph.node_label, "Return");
        assert_eq!(config.graph.text_node_properties, vec!["STATE", "No_of_return"]);
        assert_eq!(config.graph.embedding_node_property, "embedding");
        assert_eq!(config.graph.database, None);
        assert_eq!(config.graph.timeout_secs, 60);
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.server, ServerConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_connection_field_fails_to_parse() {
        let yaml = SAMPLE.replace("  nodeLabel: Return\n", "");
        assert!(matches!(
            AppConfig::from_yaml_str(&yaml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_empty_required_field_rejected() {
        let mut config = AppConfig::from_yaml_str(SAMPLE).unwrap();
        config.graph.password = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("graph.password"))
        ));

        let mut config = AppConfig::from_yaml_str(SAMPLE).unwrap();
        config.graph.text_node_properties.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("graph.text_node_properties"))
        ));
    }

    #[test]
    fn test_connection_timeout() {
        let yaml = SAMPLE.replace("  embeddingNodeProperty: embedding\n", "  embeddingNodeProperty: embedding\n  timeoutSecs: 5\n");
        let mut config = AppConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(config.graph.timeout_secs, 5);
        config.validate().unwrap();

        config.graph.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_url_without_scheme_rejected() {
        let mut config = AppConfig::from_yaml_str(SAMPLE).unwrap();
        config.graph.url = "localhost:7687".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_provider_key_rules() {
        let mut config = AppConfig::from_yaml_str(SAMPLE).unwrap();
        config.llm.api_key = None;
        assert!(config.llm.validate().is_err());

        config.llm.provider = LLMProvider::Ollama;
        config.llm.validate().unwrap();
        assert_eq!(config.llm.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_base_url_override_trims_slash() {
        let mut config = AppConfig::from_yaml_str(SAMPLE).unwrap();
        config.llm.api_base_url = Some("http://proxy.local/v1/".to_string());
        assert_eq!(config.llm.base_url(), "http://proxy.local/v1");
    }

    #[test]
    fn test_overrides_replace_secrets() {
        let mut config = AppConfig::from_yaml_str(SAMPLE).unwrap();
        config.apply_overrides(Some("sk-env".to_string()), Some(String::new()));
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.graph.password, "secret");
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = AppConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.llm.model, "gpt-4o");

        assert!(matches!(
            AppConfig::from_yaml_file("/nonexistent/graphqa.yaml"),
            Err(ConfigError::Io(_))
        ));
    }
}
