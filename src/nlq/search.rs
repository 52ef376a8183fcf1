//! Vector similarity search over the configured node index

use super::{NLQError, NLQPipeline, NLQResult};
use crate::config::ConnectionConfig;
use crate::graph::{escape_identifier, run_in_session, GraphRow, GraphValue, Params};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// One node returned by [`NLQPipeline::similarity_search`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Text properties rendered as `\n<name>: <value>` lines
    pub text: String,
    pub score: f64,
    /// Remaining node properties
    pub metadata: Map<String, Value>,
}

/// Build the index query for `config`.
///
/// The embedding and text properties are projected to null so the vector is
/// never shipped back; [`hit_from_row`] drops those keys.
pub fn search_statement(config: &ConnectionConfig) -> String {
    let excluded: Vec<String> = std::iter::once(&config.embedding_node_property)
        .chain(config.text_node_properties.iter())
        .map(|name| format!("{}: Null", escape_identifier(name)))
        .collect();

    format!(
        "CALL db.index.vector.queryNodes($index, $k, $embedding) YIELD node, score \
         RETURN reduce(str = '', k IN $text_properties | str + '\\n' + k + ': ' + coalesce(toString(node[k]), '')) AS text, \
         node {{.*, {}}} AS metadata, score",
        excluded.join(", ")
    )
}

impl NLQPipeline {
    /// Return the `k` nodes nearest to the embedding of `question`
    pub async fn similarity_search(&self, question: &str, k: usize) -> NLQResult<Vec<SearchHit>> {
        if k == 0 {
            return Err(NLQError::InvalidInput("k must be at least 1".to_string()));
        }
        let k_param = i64::try_from(k)
            .map_err(|_| NLQError::InvalidInput(format!("k is too large: {}", k)))?;
        let driver = self.driver().await?;
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| NLQError::Config("no embedding model configured".to_string()))?;

        let embedding = embedder.embed(question).await?;
        debug!(dimensions = embedding.len(), k, "Question embedded");

        let config = self.connection();
        let mut params = Params::new();
        params.insert("index".to_string(), config.index_name.clone().into());
        params.insert("k".to_string(), GraphValue::Integer(k_param));
        params.insert(
            "embedding".to_string(),
            embedding.into_iter().map(f64::from).collect::<Vec<_>>().into(),
        );
        params.insert(
            "text_properties".to_string(),
            config.text_node_properties.clone().into(),
        );

        let rows = run_in_session(&*driver, &search_statement(config), &params).await?;
        Ok(rows.iter().map(|row| hit_from_row(config, row)).collect())
    }
}

/// Convert one result row into a hit, discarding excluded properties
pub fn hit_from_row(config: &ConnectionConfig, row: &GraphRow) -> SearchHit {
    let text = row
        .get("text")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let score = row.get("score").and_then(|v| v.as_float()).unwrap_or(0.0);

    let mut metadata = match row.get("metadata").map(GraphValue::normalize) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    metadata.remove(&config.embedding_node_property);
    for name in &config.text_node_properties {
        metadata.remove(name);
    }

    SearchHit { text, score, metadata }
}
