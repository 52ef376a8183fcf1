//! Bolt transport backed by `neo4rs`
//!
//! Each session is an explicit transaction on a pooled connection. Closing
//! commits, or rolls back when a statement in the session failed.

use super::{GraphDriver, GraphError, GraphResult, GraphRow, GraphSession, GraphValue, Params};
use crate::config::ConnectionConfig;
use async_trait::async_trait;
use indexmap::IndexMap;
use neo4rs::{query, BoltList, BoltMap, BoltNull, BoltString, BoltType, ConfigBuilder, Graph, Row, Txn};
use tracing::{debug, info};

/// Driver holding a `neo4rs` connection pool
pub struct BoltDriver {
    graph: Graph,
}

impl BoltDriver {
    /// Connect to the store described by `config`
    pub async fn connect(config: &ConnectionConfig) -> GraphResult<Self> {
        let mut builder = ConfigBuilder::default()
            .uri(config.url.as_str())
            .user(config.username.as_str())
            .password(config.password.as_str());
        if let Some(db) = &config.database {
            builder = builder.db(db.as_str());
        }
        let neo_config = builder
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        info!(url = %config.url, "Connected to graph store over Bolt");
        Ok(Self { graph })
    }
}

#[async_trait]
impl GraphDriver for BoltDriver {
    async fn open_session(&self) -> GraphResult<Box<dyn GraphSession>> {
        let txn = self
            .graph
            .start_txn()
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;
        Ok(Box::new(BoltSession { txn, failed: false }))
    }
}

struct BoltSession {
    txn: Txn,
    failed: bool,
}

impl BoltSession {
    async fn collect(&mut self, statement: &str, params: &Params) -> GraphResult<Vec<GraphRow>> {
        let mut q = query(statement);
        for (key, value) in params {
            q = q.param(key.as_str(), to_bolt(value));
        }

        let mut stream = self.txn.execute(q).await.map_err(query_error)?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next(self.txn.handle()).await.map_err(query_error)? {
            rows.push(row_from_bolt(&row)?);
        }
        Ok(rows)
    }
}

/// Decode one result row.
///
/// `neo4rs` keeps row fields in an unordered map, so columns come back sorted
/// by name rather than in statement order.
pub fn row_from_bolt(row: &Row) -> GraphResult<GraphRow> {
    let map: BoltMap = row
        .to_strict()
        .map_err(|e| GraphError::Decode(e.to_string()))?;
    Ok(from_bolt_map(map))
}

#[async_trait]
impl GraphSession for BoltSession {
    async fn run(&mut self, statement: &str, params: &Params) -> GraphResult<Vec<GraphRow>> {
        let result = self.collect(statement, params).await;
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    async fn close(self: Box<Self>) -> GraphResult<()> {
        let BoltSession { txn, failed } = *self;
        if failed {
            debug!("Rolling back failed Bolt transaction");
            txn.rollback().await.map_err(query_error)
        } else {
            txn.commit().await.map_err(query_error)
        }
    }
}

fn query_error(e: neo4rs::Error) -> GraphError {
    GraphError::Query {
        code: "Bolt".to_string(),
        message: e.to_string(),
    }
}

/// Decode a Bolt value into the tagged value model
pub fn from_bolt(value: BoltType) -> GraphValue {
    match value {
        BoltType::Null(_) => GraphValue::Null,
        BoltType::Boolean(b) => GraphValue::Boolean(b.value),
        BoltType::Integer(i) => GraphValue::Integer(i.value),
        BoltType::Float(f) => GraphValue::Float(f.value),
        BoltType::String(s) => GraphValue::String(s.value),
        BoltType::Bytes(b) => GraphValue::Bytes(b.value.to_vec()),
        BoltType::List(list) => GraphValue::List(list.value.into_iter().map(from_bolt).collect()),
        BoltType::Map(map) => GraphValue::Map(from_bolt_map(map)),
        BoltType::Node(node) => GraphValue::Node {
            id: node.id.value,
            labels: node
                .labels
                .value
                .into_iter()
                .filter_map(|label| match label {
                    BoltType::String(s) => Some(s.value),
                    _ => None,
                })
                .collect(),
            properties: from_bolt_map(node.properties),
        },
        BoltType::Relation(rel) => GraphValue::Relationship {
            id: rel.id.value,
            start: rel.start_node_id.value,
            end: rel.end_node_id.value,
            rel_type: rel.typ.value,
            properties: from_bolt_map(rel.properties),
        },
        other => GraphValue::Opaque(format!("{:?}", other)),
    }
}

fn from_bolt_map(map: BoltMap) -> IndexMap<String, GraphValue> {
    let mut entries: Vec<(String, GraphValue)> = map
        .value
        .into_iter()
        .map(|(k, v)| (k.value, from_bolt(v)))
        .collect();
    // Bolt maps are unordered; sort for stable output
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries.into_iter().collect()
}

/// Encode a parameter value for Bolt
pub fn to_bolt(value: &GraphValue) -> BoltType {
    match value {
        GraphValue::Null => BoltType::Null(BoltNull),
        GraphValue::Boolean(b) => BoltType::from(*b),
        GraphValue::Integer(i) => BoltType::from(*i),
        GraphValue::Float(f) => BoltType::from(*f),
        GraphValue::String(s) | GraphValue::Opaque(s) => BoltType::from(s.as_str()),
        GraphValue::Bytes(bytes) => BoltType::List(BoltList {
            value: bytes.iter().map(|b| BoltType::from(*b as i64)).collect(),
        }),
        GraphValue::List(items) => BoltType::List(BoltList {
            value: items.iter().map(to_bolt).collect(),
        }),
        GraphValue::Map(properties)
        | GraphValue::Node { properties, .. }
        | GraphValue::Relationship { properties, .. } => BoltType::Map(BoltMap {
            value: properties
                .iter()
                .map(|(k, v)| (BoltString::from(k.as_str()), to_bolt(v)))
                .collect(),
        }),
    }
}
