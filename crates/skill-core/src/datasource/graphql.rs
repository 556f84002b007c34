//! Synchronous GraphQL data source.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use super::{DataSource, DataSourceError, QueryResponse, Variables};
use crate::event::{GraphqlResponse, SkillEvent};

/// Default pause before the single retry of a 5xx response.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Where queries go: endpoint plus bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTarget {
    pub url: String,
    pub token: String,
}

impl QueryTarget {
    pub fn new(url: &str, token: &str) -> Self {
        Self {
            url: url.to_string(),
            token: token.to_string(),
        }
    }

    /// The query endpoint and token of an inbound event.
    pub fn from_event(event: &SkillEvent) -> Self {
        Self::new(&event.urls.query, &event.token)
    }
}

#[derive(Serialize)]
struct QueryBody<'a> {
    query: &'a str,
    variables: &'a Variables,
}

/// Live query source. Blocks the calling task for the duration of the request.
///
/// Responses with HTTP >= 500 are retried exactly once after `retry_backoff`.
pub struct GraphqlDataSource {
    client: reqwest::Client,
    target: QueryTarget,
    retry_backoff: Duration,
}

impl GraphqlDataSource {
    pub fn new(client: reqwest::Client, target: QueryTarget) -> Self {
        Self {
            client,
            target,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    async fn post(
        &self,
        body: &QueryBody<'_>,
    ) -> Result<reqwest::Response, DataSourceError> {
        Ok(self
            .client
            .post(&self.target.url)
            .bearer_auth(&self.target.token)
            .json(body)
            .send()
            .await?)
    }
}

#[async_trait]
impl DataSource for GraphqlDataSource {
    async fn query(
        &self,
        query_name: &str,
        query: &str,
        variables: &Variables,
    ) -> Result<Option<QueryResponse>, DataSourceError> {
        let body = QueryBody { query, variables };

        let mut response = self.post(&body).await?;
        if response.status().is_server_error() {
            warn!(
                query_name = %query_name,
                status = response.status().as_u16(),
                backoff_ms = self.retry_backoff.as_millis() as u64,
                "query failed; retrying once"
            );
            tokio::time::sleep(self.retry_backoff).await;
            response = self.post(&body).await?;
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DataSourceError::QueryFailed {
                query_name: query_name.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let envelope: GraphqlResponse = serde_json::from_slice(&response.bytes().await?)?;
        if !envelope.errors.is_empty() {
            return Err(DataSourceError::GraphqlErrors {
                query_name: query_name.to_string(),
                messages: envelope.errors.into_iter().map(|e| e.message).collect(),
            });
        }

        debug!(query_name = %query_name, "query answered");
        Ok(Some(QueryResponse::Data(envelope.data.unwrap_or_default())))
    }
}
