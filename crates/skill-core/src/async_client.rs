//! Enqueue client for out-of-band queries.
//!
//! The backend accepts a query envelope at `<query-url>:enqueue`, runs the
//! query later, and delivers the result to the skill as an `asyncQueryResult`
//! event whose `metadata` is the opaque string sent here.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::datasource::{QueryTarget, Variables};

/// Backend message for a transient failure. Events failing with it are retried.
pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error has occurred";

/// Whether a backend message signals a transient failure.
pub fn is_unexpected_error(message: &str) -> bool {
    message.contains(UNEXPECTED_ERROR_MESSAGE)
}

#[derive(Debug, thiserror::Error)]
pub enum AsyncQueryError {
    #[error("enqueue rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("enqueue failed transiently with HTTP {status}: {body}")]
    Retryable { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

impl AsyncQueryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AsyncQueryError::Retryable { .. })
    }
}

impl From<reqwest::Error> for AsyncQueryError {
    fn from(err: reqwest::Error) -> Self {
        AsyncQueryError::Http(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AsyncQueryBody {
    pub query: String,
    pub variables: Variables,
}

/// Envelope submitted to the enqueue endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AsyncQueryRequest {
    /// Name the result event will carry, `async-query-<query-name>`.
    pub name: String,
    pub body: AsyncQueryBody,
    /// Opaque continuation token echoed back with the result.
    pub metadata: String,
}

impl AsyncQueryRequest {
    pub fn new(query_name: &str, query: &str, variables: &Variables, metadata: String) -> Self {
        Self {
            name: result_event_name(query_name),
            body: AsyncQueryBody {
                query: query.to_string(),
                variables: variables.clone(),
            },
            metadata,
        }
    }
}

/// Name of the result event for an async query.
pub fn result_event_name(query_name: &str) -> String {
    format!("async-query-{query_name}")
}

/// Submits async query envelopes.
#[async_trait]
pub trait AsyncQuerySubmitter: Send + Sync {
    async fn submit(
        &self,
        target: &QueryTarget,
        request: &AsyncQueryRequest,
    ) -> Result<(), AsyncQueryError>;
}

/// HTTP submitter. The success body is ignored.
#[derive(Debug, Clone, Default)]
pub struct AsyncQueryClient {
    client: reqwest::Client,
}

impl AsyncQueryClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn enqueue_url(target: &QueryTarget) -> String {
        format!("{}:enqueue", target.url)
    }
}

#[async_trait]
impl AsyncQuerySubmitter for AsyncQueryClient {
    async fn submit(
        &self,
        target: &QueryTarget,
        request: &AsyncQueryRequest,
    ) -> Result<(), AsyncQueryError> {
        let response = self
            .client
            .post(Self::enqueue_url(target))
            .bearer_auth(&target.token)
            .json(request)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(if is_unexpected_error(&body) {
                AsyncQueryError::Retryable { status, body }
            } else {
                AsyncQueryError::Rejected { status, body }
            });
        }

        info!(name = %request.name, "async query enqueued");
        Ok(())
    }
}
