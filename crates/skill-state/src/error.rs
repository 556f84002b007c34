//! Error types for skill-state

use thiserror::Error;

/// Errors that can occur in the object storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// No object exists under the key
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// Key is empty or contains path separators the backend cannot address
    #[error("invalid object key: {key:?}")]
    InvalidKey { key: String },

    /// Backend answered with an unexpected status
    #[error("object store returned {status} for {key}: {body}")]
    Backend {
        key: String,
        status: u16,
        body: String,
    },

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::Http(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_includes_status_and_body() {
        let err = StorageError::Backend {
            key: "abc".to_string(),
            status: 503,
            body: "unavailable".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("unavailable"));
    }

    #[test]
    fn not_found_names_key() {
        let err = StorageError::NotFound {
            key: "no-data".to_string(),
        };
        assert!(err.to_string().contains("no-data"));
    }
}
