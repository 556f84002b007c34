use std::collections::BTreeMap;

use async_trait::async_trait;

use super::{DataSource, DataSourceError, QueryResponse, Variables};
use crate::value::Value;

/// Answers queries from facts already delivered with the subscription.
///
/// Each known query name maps to a key in the common-facts map of the
/// subscription tuple. Unknown queries, and known queries whose fact is
/// missing or null, are declined.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionDataSource {
    facts: Value,
    queries: BTreeMap<String, String>,
}

impl SubscriptionDataSource {
    pub fn new(facts: Value) -> Self {
        Self {
            facts,
            queries: BTreeMap::new(),
        }
    }

    /// Answer `query_name` with the fact stored under `fact_key`.
    pub fn with_query(mut self, query_name: &str, fact_key: &str) -> Self {
        self.queries
            .insert(query_name.to_string(), fact_key.to_string());
        self
    }

    pub fn with_queries(mut self, queries: BTreeMap<String, String>) -> Self {
        self.queries.extend(queries);
        self
    }
}

#[async_trait]
impl DataSource for SubscriptionDataSource {
    async fn query(
        &self,
        query_name: &str,
        _query: &str,
        _variables: &Variables,
    ) -> Result<Option<QueryResponse>, DataSourceError> {
        let Some(fact_key) = self.queries.get(query_name) else {
            return Ok(None);
        };
        Ok(self
            .facts
            .get(fact_key)
            .filter(|v| !v.is_null())
            .cloned()
            .map(QueryResponse::Data))
    }
}
