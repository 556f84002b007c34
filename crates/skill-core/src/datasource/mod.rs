//! Query data sources.
//!
//! A [`DataSource`] answers a named query with variables. Sources are composed
//! with [`ChainDataSource`]: cheap local sources (fixed mocks, subscription
//! facts, completed async results) pre-empt network work, and the async
//! source, when present, is tried before live queries.
//!
//! A source answers in one of three ways:
//! - `Ok(None)`: it cannot answer this query; the chain moves on
//! - `Ok(Some(QueryResponse::Data(_)))`: a result
//! - `Ok(Some(QueryResponse::AsyncRequestMade))`: the query was enqueued and
//!   its result will arrive as a continuation event
//!
//! or fails with a [`DataSourceError`].

pub mod async_source;
pub mod chain;
pub mod fixed;
pub mod graphql;
pub mod provider;
pub mod subscription;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::async_client::AsyncQueryError;
use crate::continuation::ContinuationError;
use crate::value::{Value, ValueMap};

pub use async_source::AsyncDataSource;
pub use chain::ChainDataSource;
pub use fixed::FixedDataSource;
pub use graphql::{GraphqlDataSource, QueryTarget};
pub use provider::{
    DataSourceProvider, FixedDataProvider, GraphqlDataProvider, SubscriptionDataProvider,
};
pub use subscription::SubscriptionDataSource;

/// Query variables.
pub type Variables = ValueMap;

/// A successful answer from a data source.
///
/// There is no way to carry data together with an async marker.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResponse {
    Data(Value),
    AsyncRequestMade,
}

impl QueryResponse {
    pub fn async_request_made(&self) -> bool {
        matches!(self, QueryResponse::AsyncRequestMade)
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            QueryResponse::Data(value) => Some(value),
            QueryResponse::AsyncRequestMade => None,
        }
    }

    /// Decode the data into a typed structure. `Ok(None)` when the query went async.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, DataSourceError> {
        match self {
            QueryResponse::Data(value) => Ok(Some(value.decode()?)),
            QueryResponse::AsyncRequestMade => Ok(None),
        }
    }
}

/// Errors raised while answering a query.
#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    #[error("no data source available for query {query_name}")]
    NoDataSource { query_name: String },

    #[error("query {query_name} failed with HTTP {status}: {body}")]
    QueryFailed {
        query_name: String,
        status: u16,
        body: String,
    },

    #[error("query {query_name} returned errors: {}", messages.join("; "))]
    GraphqlErrors {
        query_name: String,
        messages: Vec<String>,
    },

    #[error("async query {in_flight} is already in flight; cannot enqueue {requested}")]
    AsyncQueryInFlight {
        in_flight: String,
        requested: String,
    },

    #[error("async query submission failed: {0}")]
    AsyncSubmission(#[from] AsyncQueryError),

    #[error("continuation token error: {0}")]
    Continuation(#[from] ContinuationError),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("response decoding failed: {0}")]
    Decode(#[from] serde_json::Error),
}

impl DataSourceError {
    /// Whether the infrastructure should redeliver the triggering event.
    pub fn is_retryable(&self) -> bool {
        match self {
            DataSourceError::AsyncSubmission(err) => err.is_retryable(),
            DataSourceError::GraphqlErrors { messages, .. } => messages
                .iter()
                .any(|m| crate::async_client::is_unexpected_error(m)),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for DataSourceError {
    fn from(err: reqwest::Error) -> Self {
        DataSourceError::Http(err.to_string())
    }
}

/// Uniform query interface.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Answer `query_name`. `query` is opaque query text; `query_name` must be
    /// stable for the same logical query since fixed sources key on it.
    async fn query(
        &self,
        query_name: &str,
        query: &str,
        variables: &Variables,
    ) -> Result<Option<QueryResponse>, DataSourceError>;
}
