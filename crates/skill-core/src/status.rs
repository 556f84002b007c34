//! Execution status reported out-of-band for every handled event.

use serde::{Deserialize, Serialize};

/// Lifecycle state of one skill execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Queued,
    Running,
    Completed,
    Retryable,
    Failed,
}

/// The status a handler returns; PATCHed to the execution URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub state: State,
    pub reason: String,
    /// Response body for synchronous requests. Never sent with the status report.
    #[serde(skip)]
    pub sync_request: Option<serde_json::Value>,
}

impl Status {
    pub fn new(state: State, reason: impl Into<String>) -> Self {
        Self {
            state,
            reason: reason.into(),
            sync_request: None,
        }
    }

    pub fn running(reason: impl Into<String>) -> Self {
        Self::new(State::Running, reason)
    }

    pub fn completed(reason: impl Into<String>) -> Self {
        Self::new(State::Completed, reason)
    }

    pub fn retryable(reason: impl Into<String>) -> Self {
        Self::new(State::Retryable, reason)
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::new(State::Failed, reason)
    }

    /// Attach a synchronous response body.
    pub fn with_sync_request(mut self, body: serde_json::Value) -> Self {
        self.sync_request = Some(body);
        self
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, State::Completed | State::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_state_and_reason_only() {
        let status = Status::completed("done").with_sync_request(serde_json::json!([1]));
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json, serde_json::json!({"state": "completed", "reason": "done"}));
    }

    #[test]
    fn running_and_retryable_are_not_terminal() {
        assert!(!Status::running("waiting").is_terminal());
        assert!(!Status::retryable("again").is_terminal());
        assert!(Status::failed("boom").is_terminal());
    }
}
