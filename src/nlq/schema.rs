//! Schema introspection
//!
//! Properties are sampled from one arbitrary node per label and one arbitrary
//! relationship per type, so labels or types without any instance contribute
//! nothing and sparse properties may be missed.

use crate::graph::{escape_identifier, GraphError, GraphResult, GraphRow, GraphSession, Params};
use serde::Serialize;
use std::fmt;

/// Kind of schema element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    Node,
    Relationship,
}

/// A label or relationship type with its sampled property keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaEntry {
    pub kind: SchemaKind,
    pub name: String,
    pub properties: Vec<String>,
}

/// Textual schema handed to the language model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaDescription {
    pub entries: Vec<SchemaEntry>,
}

impl SchemaDescription {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SchemaEntry> {
        self.entries.iter().filter(|e| e.kind == SchemaKind::Node)
    }

    pub fn relationships(&self) -> impl Iterator<Item = &SchemaEntry> {
        self.entries.iter().filter(|e| e.kind == SchemaKind::Relationship)
    }
}

impl fmt::Display for SchemaDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            let heading = match entry.kind {
                SchemaKind::Node => "Node label",
                SchemaKind::Relationship => "Relationship type",
            };
            write!(
                f,
                "{}: {}\nProperties: {}\n\n",
                heading,
                entry.name,
                entry.properties.join(", ")
            )?;
        }
        Ok(())
    }
}

/// Read labels, relationship types and sampled property keys
pub async fn introspect(session: &mut dyn GraphSession) -> GraphResult<SchemaDescription> {
    let mut entries = Vec::new();

    let labels = string_column(
        session.run("CALL db.labels() YIELD label RETURN label", &Params::new()).await?,
        "label",
    )?;
    for label in labels {
        let statement = format!(
            "MATCH (n:{}) RETURN keys(n) AS properties LIMIT 1",
            escape_identifier(&label)
        );
        if let Some(properties) = sampled_keys(session, &statement).await? {
            entries.push(SchemaEntry {
                kind: SchemaKind::Node,
                name: label,
                properties,
            });
        }
    }

    let rel_types = string_column(
        session
            .run(
                "CALL db.relationshipTypes() YIELD relationshipType RETURN relationshipType",
                &Params::new(),
            )
            .await?,
        "relationshipType",
    )?;
    for rel_type in rel_types {
        let statement = format!(
            "MATCH ()-[r:{}]->() RETURN keys(r) AS properties LIMIT 1",
            escape_identifier(&rel_type)
        );
        if let Some(properties) = sampled_keys(session, &statement).await? {
            entries.push(SchemaEntry {
                kind: SchemaKind::Relationship,
                name: rel_type,
                properties,
            });
        }
    }

    Ok(SchemaDescription { entries })
}

async fn sampled_keys(
    session: &mut dyn GraphSession,
    statement: &str,
) -> GraphResult<Option<Vec<String>>> {
    let rows = session.run(statement, &Params::new()).await?;
    let Some(row) = rows.first() else {
        return Ok(None);
    };
    let keys = row
        .get("properties")
        .and_then(|v| v.as_string_list())
        .ok_or_else(|| GraphError::Decode("properties column is not a list of strings".to_string()))?;
    Ok(Some(keys))
}

fn string_column(rows: Vec<GraphRow>, column: &str) -> GraphResult<Vec<String>> {
    rows.into_iter()
        .map(|row| match row.get(column).and_then(|v| v.as_str()) {
            Some(s) => Ok(s.to_string()),
            None => Err(GraphError::Decode(format!("column {} is not a string", column))),
        })
        .collect()
}
