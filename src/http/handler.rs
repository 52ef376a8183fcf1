//! HTTP handlers for the question answering API

use crate::nlq::{AskOptions, NLQError, NLQPipeline, QaAnswer, SearchHit};
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Number of hits returned by `/api/search` when `k` is omitted
pub const DEFAULT_SEARCH_K: usize = 4;

/// Request for answering a question
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub include_raw_results: bool,
    #[serde(default)]
    pub skip_cache: bool,
}

/// Request for a vector similarity search
#[derive(Deserialize)]
pub struct SearchRequest {
    pub question: String,
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    DEFAULT_SEARCH_K
}

/// Pipeline error rendered as `{"error": ...}`
pub struct ApiError(pub NLQError);

impl From<NLQError> for ApiError {
    fn from(e: NLQError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            NLQError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            NLQError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
            NLQError::Config(_) | NLQError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
            NLQError::Api(_)
            | NLQError::Network(_)
            | NLQError::Serialization(_)
            | NLQError::Graph(_)
            | NLQError::Embed(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

fn require_question(question: &str) -> Result<(), ApiError> {
    if question.trim().is_empty() {
        return Err(NLQError::InvalidInput("question must not be empty".to_string()).into());
    }
    Ok(())
}

/// Handler for natural language questions
pub async fn ask_handler(
    State(pipeline): State<Arc<NLQPipeline>>,
    Json(payload): Json<AskRequest>,
) -> Result<Json<QaAnswer>, ApiError> {
    require_question(&payload.question)?;
    let options = AskOptions {
        skip_cache: payload.skip_cache,
        include_raw_results: payload.include_raw_results,
    };
    Ok(Json(pipeline.ask(&payload.question, options).await?))
}

/// Handler for vector similarity search
pub async fn search_handler(
    State(pipeline): State<Arc<NLQPipeline>>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<Vec<SearchHit>>, ApiError> {
    require_question(&payload.question)?;
    Ok(Json(pipeline.similarity_search(&payload.question, payload.k).await?))
}

/// Handler returning the introspected schema text
pub async fn schema_handler(
    State(pipeline): State<Arc<NLQPipeline>>,
) -> Result<impl IntoResponse, ApiError> {
    let schema = pipeline.schema().await?;
    Ok(Json(json!({ "schema": schema.to_string() })))
}

/// Handler for system status
pub async fn status_handler(State(pipeline): State<Arc<NLQPipeline>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": crate::VERSION,
        "connected": pipeline.is_connected().await,
    }))
}
