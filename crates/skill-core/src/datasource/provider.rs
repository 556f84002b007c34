//! Pluggable data-source factories.
//!
//! The orchestrator asks each registered provider for a source per evaluation
//! and chains the ones it gets, in registration order.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::graphql::DEFAULT_RETRY_BACKOFF;
use super::{DataSource, FixedDataSource, GraphqlDataSource, QueryTarget, SubscriptionDataSource};
use crate::continuation::EvaluationMetadata;
use crate::handler::RequestContext;

/// Builds zero or one data source for an evaluation.
pub trait DataSourceProvider: Send + Sync {
    fn data_source(
        &self,
        ctx: &RequestContext,
        metadata: &EvaluationMetadata,
    ) -> Option<Arc<dyn DataSource>>;

    /// Usable without network access, for local evaluation.
    fn available_offline(&self) -> bool {
        true
    }
}

/// Always contributes the same fixed results.
#[derive(Debug, Clone, Default)]
pub struct FixedDataProvider {
    source: Arc<FixedDataSource>,
}

impl FixedDataProvider {
    pub fn new(source: FixedDataSource) -> Self {
        Self {
            source: Arc::new(source),
        }
    }
}

impl DataSourceProvider for FixedDataProvider {
    fn data_source(
        &self,
        _ctx: &RequestContext,
        _metadata: &EvaluationMetadata,
    ) -> Option<Arc<dyn DataSource>> {
        if self.source.is_empty() {
            return None;
        }
        Some(self.source.clone())
    }
}

/// Answers from the common facts of the first subscription tuple.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionDataProvider {
    queries: BTreeMap<String, String>,
}

impl SubscriptionDataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `query_name` with the fact stored under `fact_key`.
    pub fn with_query(mut self, query_name: &str, fact_key: &str) -> Self {
        self.queries
            .insert(query_name.to_string(), fact_key.to_string());
        self
    }
}

impl DataSourceProvider for SubscriptionDataProvider {
    fn data_source(
        &self,
        _ctx: &RequestContext,
        metadata: &EvaluationMetadata,
    ) -> Option<Arc<dyn DataSource>> {
        let facts = metadata.common_facts()?;
        Some(Arc::new(
            SubscriptionDataSource::new(facts.clone()).with_queries(self.queries.clone()),
        ))
    }
}

/// Live queries against the event's query endpoint.
#[derive(Debug, Clone)]
pub struct GraphqlDataProvider {
    retry_backoff: Duration,
}

impl Default for GraphqlDataProvider {
    fn default() -> Self {
        Self {
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl GraphqlDataProvider {
    pub fn new(retry_backoff: Duration) -> Self {
        Self { retry_backoff }
    }
}

impl DataSourceProvider for GraphqlDataProvider {
    fn data_source(
        &self,
        ctx: &RequestContext,
        _metadata: &EvaluationMetadata,
    ) -> Option<Arc<dyn DataSource>> {
        if ctx.event.urls.query.is_empty() {
            return None;
        }
        Some(Arc::new(
            GraphqlDataSource::new(ctx.http.clone(), QueryTarget::from_event(&ctx.event))
                .with_retry_backoff(self.retry_backoff),
        ))
    }

    fn available_offline(&self) -> bool {
        false
    }
}
