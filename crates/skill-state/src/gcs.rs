//! Cloud object store client
//!
//! Stores evaluation results in a bucket through the storage JSON API.
//! Writes carry the `ifGenerationMatch=0` precondition, so the backend itself
//! provides the "create if absent" atomicity; a failed precondition (HTTP 412)
//! is reported as `PutOutcome::AlreadyExists`.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StorageError;
use crate::storage_traits::{validate_key, ObjectStore, PutOutcome, StorageResult};

const DEFAULT_BASE_URL: &str = "https://storage.googleapis.com";

/// Deployment environment; selects the results bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Staging,
    Production,
}

impl Environment {
    /// Read `SKILL_ENVIRONMENT`, defaulting to staging.
    pub fn from_env() -> Self {
        std::env::var("SKILL_ENVIRONMENT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    /// Deterministic bucket name for evaluation results.
    pub fn results_bucket(&self) -> &'static str {
        match self {
            Environment::Staging => "policy-evaluation-results-staging",
            Environment::Production => "policy-evaluation-results-production",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Staging => f.write_str("staging"),
            Environment::Production => f.write_str("production"),
        }
    }
}

/// Object store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcsConfig {
    /// API base URL
    pub base_url: String,
    /// Bucket holding evaluation results
    pub bucket: String,
    /// OAuth access token (optional for emulators)
    pub token: Option<String>,
}

impl Default for GcsConfig {
    fn default() -> Self {
        let environment = Environment::from_env();
        GcsConfig {
            base_url: std::env::var("SKILL_STORAGE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            bucket: std::env::var("SKILL_STORAGE_BUCKET")
                .unwrap_or_else(|_| environment.results_bucket().to_string()),
            token: std::env::var("SKILL_STORAGE_TOKEN").ok(),
        }
    }
}

impl GcsConfig {
    /// Create a config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for the results bucket of `environment`
    pub fn for_environment(environment: Environment) -> Self {
        GcsConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            bucket: environment.results_bucket().to_string(),
            token: None,
        }
    }

    /// Point the client at a different API endpoint (emulators, tests)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Set authentication token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

/// Object store backed by a cloud storage bucket
pub struct GcsObjectStore {
    config: GcsConfig,
    http_client: reqwest::Client,
}

impl GcsObjectStore {
    /// Create a new client
    pub fn new(config: GcsConfig) -> StorageResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("skill-state/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(GcsObjectStore {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> StorageResult<Self> {
        Self::new(GcsConfig::from_env())
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.config.base_url, self.config.bucket, key
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn backend_error(key: &str, response: reqwest::Response) -> StorageError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        StorageError::Backend {
            key: key.to_string(),
            status,
            body,
        }
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn put_if_absent(&self, key: &str, data: &[u8]) -> StorageResult<PutOutcome> {
        validate_key(key)?;
        let url = format!(
            "{}/upload/storage/v1/b/{}/o",
            self.config.base_url, self.config.bucket
        );
        let request = self
            .http_client
            .post(&url)
            .query(&[
                ("uploadType", "media"),
                ("name", key),
                ("ifGenerationMatch", "0"),
            ])
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(data.to_vec());

        let response = self.authorize(request).send().await?;
        match response.status() {
            status if status.is_success() => {
                info!(bucket = %self.config.bucket, key = %key, "stored object");
                Ok(PutOutcome::Created)
            }
            StatusCode::PRECONDITION_FAILED => {
                debug!(bucket = %self.config.bucket, key = %key, "object already exists");
                Ok(PutOutcome::AlreadyExists)
            }
            _ => Err(Self::backend_error(key, response).await),
        }
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        validate_key(key)?;
        let request = self
            .http_client
            .get(self.object_url(key))
            .query(&[("alt", "media")]);

        let response = self.authorize(request).send().await?;
        match response.status() {
            status if status.is_success() => Ok(response.bytes().await?.to_vec()),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
            _ => Err(Self::backend_error(key, response).await),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        let request = self.http_client.get(self.object_url(key));

        let response = self.authorize(request).send().await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::backend_error(key, response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_selects_bucket() {
        assert_eq!(
            Environment::Staging.results_bucket(),
            "policy-evaluation-results-staging"
        );
        assert_eq!(
            Environment::Production.results_bucket(),
            "policy-evaluation-results-production"
        );
    }

    #[test]
    fn environment_parses_aliases() {
        assert_eq!("prod".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!(" Staging ".parse::<Environment>(), Ok(Environment::Staging));
        assert!("dev".parse::<Environment>().is_err());
    }

    #[test]
    fn config_for_environment() {
        let config = GcsConfig::for_environment(Environment::Production)
            .with_base_url("http://127.0.0.1:9000/")
            .with_token("secret");
        assert_eq!(config.bucket, "policy-evaluation-results-production");
        assert_eq!(config.base_url, "http://127.0.0.1:9000");
        assert_eq!(config.token.as_deref(), Some("secret"));
    }
}
