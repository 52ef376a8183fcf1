//! Graph store access
//!
//! A [`GraphDriver`] is the long-lived connection handle; every unit of work
//! runs inside a [`GraphSession`] that is closed when the work finishes,
//! whether it succeeded or not. Two transports are provided:
//!
//! - [`BoltDriver`]: the Bolt protocol via `neo4rs`
//! - [`HttpDriver`]: the Neo4j HTTP transactional API via `reqwest`

pub mod bolt;
pub mod http;
pub mod value;

pub use bolt::BoltDriver;
pub use http::HttpDriver;
pub use value::{GraphRow, GraphValue, QueryRecord};

use crate::config::ConnectionConfig;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Errors raised by graph store transports
#[derive(Error, Debug)]
pub enum GraphError {
    /// Driver could not be created or the store is unreachable
    #[error("Connection error: {0}")]
    Connection(String),

    /// The store rejected a statement
    #[error("Query error [{code}]: {message}")]
    Query { code: String, message: String },

    /// Unexpected response from the store
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A result value could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Named statement parameters
pub type Params = IndexMap<String, GraphValue>;

/// A unit of work against the store.
#[async_trait]
pub trait GraphSession: Send {
    /// Run a statement and collect every result row
    async fn run(&mut self, statement: &str, params: &Params) -> GraphResult<Vec<GraphRow>>;

    /// Release the session
    async fn close(self: Box<Self>) -> GraphResult<()>;
}

/// Connection handle able to open sessions.
#[async_trait]
pub trait GraphDriver: Send + Sync {
    async fn open_session(&self) -> GraphResult<Box<dyn GraphSession>>;

    /// Verify the store is reachable
    async fn ping(&self) -> GraphResult<()> {
        run_in_session(self, "RETURN 1 AS ok", &Params::new()).await?;
        Ok(())
    }
}

/// Open a session, run one statement and close the session.
///
/// The session is closed on both paths. When the statement fails its error is
/// returned and a failing close is only logged.
pub async fn run_in_session<D>(
    driver: &D,
    statement: &str,
    params: &Params,
) -> GraphResult<Vec<GraphRow>>
where
    D: GraphDriver + ?Sized,
{
    let mut session = driver.open_session().await?;
    let outcome = session.run(statement, params).await;
    finish_session(session, outcome).await
}

/// Close `session` and merge the close result with the work's outcome
pub async fn finish_session<T>(
    session: Box<dyn GraphSession>,
    outcome: GraphResult<T>,
) -> GraphResult<T> {
    let closed = session.close().await;
    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!("Failed to close session after error: {}", close_err);
            Err(e)
        }
    }
}

/// Transport selected from a connection URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Bolt,
    Http,
}

impl Transport {
    pub fn from_url(url: &str) -> GraphResult<Self> {
        let scheme = url
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .ok_or_else(|| GraphError::Connection(format!("URL has no scheme: {}", url)))?;

        match scheme.as_str() {
            "bolt" | "bolt+s" | "bolt+ssc" | "neo4j" | "neo4j+s" | "neo4j+ssc" => {
                Ok(Transport::Bolt)
            }
            "http" | "https" => Ok(Transport::Http),
            other => Err(GraphError::Connection(format!(
                "Unsupported URL scheme: {}",
                other
            ))),
        }
    }
}

/// Create a driver for the configured endpoint
pub async fn connect(config: &ConnectionConfig) -> GraphResult<Arc<dyn GraphDriver>> {
    match Transport::from_url(&config.url)? {
        Transport::Bolt => Ok(Arc::new(BoltDriver::connect(config).await?)),
        Transport::Http => Ok(Arc::new(HttpDriver::new(config)?)),
    }
}

/// Quote a label, relationship type or property name for use in Cypher
pub fn escape_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        closed: AtomicUsize,
        statements: Mutex<Vec<String>>,
    }

    struct FakeDriver {
        counters: Arc<Counters>,
        fail_run: bool,
        fail_close: bool,
    }

    struct FakeSession {
        counters: Arc<Counters>,
        fail_run: bool,
        fail_close: bool,
    }

    #[async_trait]
    impl GraphSession for FakeSession {
        async fn run(&mut self, statement: &str, _params: &Params) -> GraphResult<Vec<GraphRow>> {
            self.counters.statements.lock().unwrap().push(statement.to_string());
            if self.fail_run {
                return Err(GraphError::Query {
                    code: "Neo.ClientError.Statement.SyntaxError".to_string(),
                    message: "bad".to_string(),
                });
            }
            let mut row = GraphRow::new();
            row.insert("ok".to_string(), GraphValue::Integer(1));
            Ok(vec![row])
        }

        async fn close(self: Box<Self>) -> GraphResult<()> {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(GraphError::Protocol("close failed".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl GraphDriver for FakeDriver {
        async fn open_session(&self) -> GraphResult<Box<dyn GraphSession>> {
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSession {
                counters: Arc::clone(&self.counters),
                fail_run: self.fail_run,
                fail_close: self.fail_close,
            }))
        }
    }

    fn driver(fail_run: bool, fail_close: bool) -> (FakeDriver, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let driver = FakeDriver {
            counters: Arc::clone(&counters),
            fail_run,
            fail_close,
        };
        (driver, counters)
    }

    #[tokio::test]
    async fn test_session_closed_after_success() {
        let (driver, counters) = driver(false, false);
        let rows = run_in_session(&driver, "RETURN 1 AS ok", &Params::new()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_session_closed_after_failure() {
        let (driver, counters) = driver(true, true);
        let err = run_in_session(&driver, "MATCH (", &Params::new()).await.unwrap_err();
        // The statement error wins over the close error
        assert!(matches!(err, GraphError::Query { .. }));
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_failure_surfaces_on_success_path() {
        let (driver, _) = driver(false, true);
        let err = run_in_session(&driver, "RETURN 1", &Params::new()).await.unwrap_err();
        assert!(matches!(err, GraphError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_default_ping_runs_probe_statement() {
        let (driver, counters) = driver(false, false);
        driver.ping().await.unwrap();
        assert_eq!(
            counters.statements.lock().unwrap().as_slice(),
            ["RETURN 1 AS ok".to_string()]
        );
    }

    #[test]
    fn test_transport_from_url() {
        assert_eq!(Transport::from_url("bolt://localhost:7687").unwrap(), Transport::Bolt);
        assert_eq!(Transport::from_url("neo4j+s://x.databases.neo4j.io").unwrap(), Transport::Bolt);
        assert_eq!(Transport::from_url("HTTP://localhost:7474").unwrap(), Transport::Http);
        assert!(Transport::from_url("ftp://localhost").is_err());
        assert!(Transport::from_url("localhost").is_err());
    }

    #[test]
    fn test_escape_identifier() {
        assert_eq!(escape_identifier("Person"), "`Person`");
        assert_eq!(escape_identifier("No of returns"), "`No of returns`");
        assert_eq!(escape_identifier("a`b"), "`a``b`");
    }
}
