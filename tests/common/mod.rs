//! In-memory fakes shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use graphqa::embed::{EmbedResult, Embedder};
use graphqa::graph::{GraphDriver, GraphError, GraphResult, GraphRow, GraphSession, GraphValue, Params};
use graphqa::nlq::{ChatMessage, ChatModel, NLQError, NLQResult};
use graphqa::ConnectionConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn connection() -> ConnectionConfig {
    ConnectionConfig {
        url: "bolt://localhost:7687".to_string(),
        username: "neo4j".to_string(),
        password: "secret".to_string(),
        database: None,
        index_name: "returns".to_string(),
        node_label: "Return".to_string(),
        text_node_properties: vec!["STATE".to_string()],
        embedding_node_property: "embedding".to_string(),
        timeout_secs: 60,
    }
}

pub fn row(pairs: Vec<(&str, GraphValue)>) -> GraphRow {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

#[derive(Clone)]
enum Reply {
    Rows(Vec<GraphRow>),
    Fail { code: String, message: String },
}

#[derive(Default)]
struct StoreState {
    replies: Mutex<HashMap<String, Reply>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    statements: Mutex<Vec<(String, Params)>>,
}

/// Graph store answering statements from a table; unknown statements
/// return no rows. Clones share state.
#[derive(Clone, Default)]
pub struct FakeStore {
    state: Arc<StoreState>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, statement: &str, rows: Vec<GraphRow>) {
        self.state
            .replies
            .lock()
            .unwrap()
            .insert(statement.to_string(), Reply::Rows(rows));
    }

    pub fn fail(&self, statement: &str, code: &str, message: &str) {
        self.state.replies.lock().unwrap().insert(
            statement.to_string(),
            Reply::Fail {
                code: code.to_string(),
                message: message.to_string(),
            },
        );
    }

    /// One `State` label with `STATE` and `No_of_return` properties
    pub fn with_tax_schema(self) -> Self {
        self.respond(
            "CALL db.labels() YIELD label RETURN label",
            vec![row(vec![("label", "State".into())])],
        );
        self.respond(
            "MATCH (n:`State`) RETURN keys(n) AS properties LIMIT 1",
            vec![row(vec![("properties", vec!["STATE", "No_of_return"].into())])],
        );
        self
    }

    pub fn driver(&self) -> Arc<dyn GraphDriver> {
        Arc::new(self.clone())
    }

    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn statements(&self) -> Vec<String> {
        self.state
            .statements
            .lock()
            .unwrap()
            .iter()
            .map(|(s, _)| s.clone())
            .collect()
    }

    /// Parameters of the first run of `statement`
    pub fn params_of(&self, statement: &str) -> Option<Params> {
        self.state
            .statements
            .lock()
            .unwrap()
            .iter()
            .find(|(s, _)| s == statement)
            .map(|(_, p)| p.clone())
    }
}

#[async_trait]
impl GraphDriver for FakeStore {
    async fn open_session(&self) -> GraphResult<Box<dyn GraphSession>> {
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeSession {
    state: Arc<StoreState>,
}

#[async_trait]
impl GraphSession for FakeSession {
    async fn run(&mut self, statement: &str, params: &Params) -> GraphResult<Vec<GraphRow>> {
        self.state
            .statements
            .lock()
            .unwrap()
            .push((statement.to_string(), params.clone()));
        let reply = self.state.replies.lock().unwrap().get(statement).cloned();
        match reply {
            Some(Reply::Rows(rows)) => Ok(rows),
            Some(Reply::Fail { code, message }) => Err(GraphError::Query { code, message }),
            None => Ok(Vec::new()),
        }
    }

    async fn close(self: Box<Self>) -> GraphResult<()> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Language model replaying scripted replies in order
#[derive(Default)]
pub struct FakeModel {
    replies: Mutex<VecDeque<String>>,
    pub calls: Mutex<Vec<(Vec<ChatMessage>, f32)>>,
}

impl FakeModel {
    pub fn replying(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// System message of the `index`-th call
    pub fn system_prompt(&self, index: usize) -> String {
        self.calls.lock().unwrap()[index].0[0].content.clone()
    }
}

#[async_trait]
impl ChatModel for FakeModel {
    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> NLQResult<String> {
        self.calls
            .lock()
            .unwrap()
            .push((messages.to_vec(), temperature));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| NLQError::Api("no scripted reply left".to_string()))
    }
}

/// Embedder returning the same vector for every text
pub struct FixedEmbedder(pub Vec<f32>);

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> EmbedResult<Vec<f32>> {
        Ok(self.0.clone())
    }
}
