use thiserror::Error;

use crate::continuation::ContinuationError;
use crate::datasource::DataSourceError;
use crate::digest::DigestError;
use crate::transact::TransactError;

/// Errors surfaced while handling one event.
#[derive(Debug, Error)]
pub enum SkillError {
    #[error("missing required configuration parameter {name}")]
    MissingParameter { name: String },

    #[error("no evaluator registered for definition {definition}")]
    UnknownEvaluator { definition: String },

    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error(transparent)]
    DataSource(#[from] DataSourceError),

    #[error(transparent)]
    Continuation(#[from] ContinuationError),

    #[error("hashing failed: {0}")]
    Digest(#[from] DigestError),

    #[error("storage error: {0}")]
    Storage(#[from] skill_state::StorageError),

    #[error("transaction failed: {0}")]
    Transact(#[from] TransactError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SkillError {
    /// Whether the infrastructure should redeliver the event.
    pub fn is_retryable(&self) -> bool {
        match self {
            SkillError::DataSource(err) => err.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SkillError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::async_client::AsyncQueryError;

    #[test]
    fn retryability_follows_data_source() {
        let err: SkillError = DataSourceError::AsyncSubmission(AsyncQueryError::Retryable {
            status: 500,
            body: "An unexpected error has occurred".into(),
        })
        .into();
        assert!(err.is_retryable());

        let err = SkillError::MissingParameter {
            name: "definitionName".into(),
        };
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "missing required configuration parameter definitionName"
        );
    }
}
