//! Per-event collaborators supplied by the hosting platform.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::event::SkillEvent;
use crate::status::Status;
use crate::transact::{HttpTransactor, Transactor};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("status report rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Http(err.to_string())
    }
}

#[async_trait]
pub trait SkillBackend: Send + Sync {
    /// Transactor bound to the event's transactions URL.
    fn transactor(&self, event: &SkillEvent) -> Arc<dyn Transactor>;

    /// Shared client for outbound queries.
    fn http_client(&self) -> reqwest::Client;

    async fn report_status(&self, event: &SkillEvent, status: &Status) -> Result<(), BackendError>;
}

/// Talks to the execution's callback URLs with the event's bearer token.
#[derive(Debug, Clone, Default)]
pub struct HttpBackend {
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SkillBackend for HttpBackend {
    fn transactor(&self, event: &SkillEvent) -> Arc<dyn Transactor> {
        Arc::new(HttpTransactor::new(
            self.client.clone(),
            &event.urls.transactions,
            &event.token,
        ))
    }

    fn http_client(&self) -> reqwest::Client {
        self.client.clone()
    }

    async fn report_status(&self, event: &SkillEvent, status: &Status) -> Result<(), BackendError> {
        let response = self
            .client
            .patch(&event.urls.execution)
            .bearer_auth(&event.token)
            .json(status)
            .send()
            .await?;

        let code = response.status();
        if !code.is_success() {
            return Err(BackendError::Rejected {
                status: code.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        debug!(state = ?status.state, "status reported");
        Ok(())
    }
}
