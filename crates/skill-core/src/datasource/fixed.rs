use std::collections::BTreeMap;

use async_trait::async_trait;

use super::{DataSource, DataSourceError, QueryResponse, Variables};
use crate::value::Value;

/// Answers queries from a fixed query-name → result map.
///
/// Used for local mocks and for async results that already arrived.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixedDataSource {
    results: BTreeMap<String, Value>,
}

impl FixedDataSource {
    pub fn new(results: BTreeMap<String, Value>) -> Self {
        Self { results }
    }

    pub fn with_result(mut self, query_name: &str, result: impl Into<Value>) -> Self {
        self.results.insert(query_name.to_string(), result.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[async_trait]
impl DataSource for FixedDataSource {
    async fn query(
        &self,
        query_name: &str,
        _query: &str,
        _variables: &Variables,
    ) -> Result<Option<QueryResponse>, DataSourceError> {
        Ok(self
            .results
            .get(query_name)
            .cloned()
            .map(QueryResponse::Data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn answers_known_queries_only() {
        let source = FixedDataSource::default().with_result("image-details", "ok");
        let vars = Variables::new();

        let hit = source.query("image-details", "", &vars).await.unwrap();
        assert_eq!(hit, Some(QueryResponse::Data(Value::from("ok"))));
        assert_eq!(source.query("packages", "", &vars).await.unwrap(), None);
    }
}
