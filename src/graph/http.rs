//! HTTP transport for the Neo4j transactional Cypher endpoint
//!
//! A session is a server-side transaction: `open_session` posts to
//! `/db/{database}/tx`, `run` posts statements to the transaction URL and
//! `close` posts to the commit URL (or deletes the transaction after a
//! failed statement).

use super::{GraphDriver, GraphError, GraphResult, GraphRow, GraphSession, GraphValue, Params};
use crate::config::ConnectionConfig;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_DATABASE: &str = "neo4j";

struct Credentials {
    username: String,
    password: String,
}

/// Driver speaking the HTTP transactional API
pub struct HttpDriver {
    http_client: Client,
    tx_endpoint: String,
    credentials: Arc<Credentials>,
}

impl HttpDriver {
    /// Create a driver for the HTTP endpoint in `config.url`
    pub fn new(config: &ConnectionConfig) -> GraphResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let database = config.database.as_deref().unwrap_or(DEFAULT_DATABASE);
        let tx_endpoint = format!("{}/db/{}/tx", config.url.trim_end_matches('/'), database);
        info!(endpoint = %tx_endpoint, "Using graph store HTTP API");

        Ok(Self {
            http_client,
            tx_endpoint,
            credentials: Arc::new(Credentials {
                username: config.username.clone(),
                password: config.password.clone(),
            }),
        })
    }
}

#[async_trait]
impl GraphDriver for HttpDriver {
    async fn open_session(&self) -> GraphResult<Box<dyn GraphSession>> {
        let request = self
            .http_client
            .post(&self.tx_endpoint)
            .json(&TxRequest { statements: vec![] });
        let TxResponse { commit, errors, .. } = send(request, &self.credentials).await?;
        if let Some(err) = errors.into_iter().next() {
            return Err(err.into());
        }

        let commit_url = commit
            .ok_or_else(|| GraphError::Protocol("transaction response has no commit URL".to_string()))?;
        let tx_url = commit_url
            .strip_suffix("/commit")
            .ok_or_else(|| GraphError::Protocol(format!("unexpected commit URL: {}", commit_url)))?
            .to_string();

        debug!(tx = %tx_url, "Opened HTTP transaction");
        Ok(Box::new(HttpSession {
            http_client: self.http_client.clone(),
            credentials: Arc::clone(&self.credentials),
            tx_url,
            commit_url,
            failed: false,
        }))
    }
}

struct HttpSession {
    http_client: Client,
    credentials: Arc<Credentials>,
    tx_url: String,
    commit_url: String,
    failed: bool,
}

#[async_trait]
impl GraphSession for HttpSession {
    async fn run(&mut self, statement: &str, params: &Params) -> GraphResult<Vec<GraphRow>> {
        let parameters = params
            .iter()
            .map(|(k, v)| (k.clone(), v.normalize()))
            .collect();
        let request = self.http_client.post(&self.tx_url).json(&TxRequest {
            statements: vec![Statement {
                statement,
                parameters,
                result_data_contents: ["row"],
            }],
        });

        let result = match send(request, &self.credentials).await {
            Ok(body) => body.into_rows(),
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    async fn close(self: Box<Self>) -> GraphResult<()> {
        if self.failed {
            // Neo4j discards a transaction after a failed statement; the
            // delete may legitimately 404.
            let request = self.http_client.delete(&self.tx_url);
            let _ = authorized(request, &self.credentials).send().await;
            return Ok(());
        }

        let request = self
            .http_client
            .post(&self.commit_url)
            .json(&TxRequest { statements: vec![] });
        send(request, &self.credentials).await?.into_rows()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct TxRequest<'a> {
    statements: Vec<Statement<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Statement<'a> {
    statement: &'a str,
    parameters: serde_json::Map<String, Value>,
    result_data_contents: [&'static str; 1],
}

#[derive(Deserialize)]
struct TxResponse {
    #[serde(default)]
    commit: Option<String>,
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<ServerError>,
}

#[derive(Deserialize)]
struct StatementResult {
    columns: Vec<String>,
    data: Vec<DataRow>,
}

#[derive(Deserialize)]
struct DataRow {
    row: Vec<Value>,
}

#[derive(Deserialize)]
struct ServerError {
    code: String,
    message: String,
}

impl From<ServerError> for GraphError {
    fn from(err: ServerError) -> Self {
        GraphError::Query {
            code: err.code,
            message: err.message,
        }
    }
}

impl TxResponse {
    /// Rows of the first statement result, or the first server error
    fn into_rows(self) -> GraphResult<Vec<GraphRow>> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err.into());
        }

        let Some(result) = self.results.into_iter().next() else {
            return Ok(Vec::new());
        };

        result
            .data
            .into_iter()
            .map(|data| {
                if data.row.len() != result.columns.len() {
                    return Err(GraphError::Decode(format!(
                        "row has {} values for {} columns",
                        data.row.len(),
                        result.columns.len()
                    )));
                }
                Ok(result
                    .columns
                    .iter()
                    .cloned()
                    .zip(data.row.into_iter().map(GraphValue::from_json))
                    .collect())
            })
            .collect()
    }
}

fn authorized(request: RequestBuilder, credentials: &Credentials) -> RequestBuilder {
    request.basic_auth(&credentials.username, Some(&credentials.password))
}

async fn send(request: RequestBuilder, credentials: &Credentials) -> GraphResult<TxResponse> {
    let response = authorized(request, credentials)
        .send()
        .await
        .map_err(|e| GraphError::Connection(e.to_string()))?;
    decode(response).await
}

async fn decode(response: Response) -> GraphResult<TxResponse> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        // Auth failures still carry the standard error envelope
        if let Ok(body) = serde_json::from_str::<TxResponse>(&text) {
            if let Some(err) = body.errors.into_iter().next() {
                return Err(err.into());
            }
        }
        return Err(GraphError::Connection(format!("HTTP {}: {}", status, text)));
    }

    response
        .json()
        .await
        .map_err(|e| GraphError::Protocol(e.to_string()))
}
