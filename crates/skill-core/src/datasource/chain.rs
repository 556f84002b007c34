use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{DataSource, DataSourceError, QueryResponse, Variables};

/// Ordered fallback over several data sources.
///
/// The first source returning a response or an error wins; later sources are
/// not consulted. When every source declines, the chain fails with
/// [`DataSourceError::NoDataSource`].
#[derive(Clone, Default)]
pub struct ChainDataSource {
    sources: Vec<Arc<dyn DataSource>>,
}

impl ChainDataSource {
    pub fn new(sources: Vec<Arc<dyn DataSource>>) -> Self {
        Self { sources }
    }

    pub fn push(&mut self, source: Arc<dyn DataSource>) {
        self.sources.push(source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl DataSource for ChainDataSource {
    async fn query(
        &self,
        query_name: &str,
        query: &str,
        variables: &Variables,
    ) -> Result<Option<QueryResponse>, DataSourceError> {
        for (position, source) in self.sources.iter().enumerate() {
            if let Some(response) = source.query(query_name, query, variables).await? {
                debug!(query_name = %query_name, position, "data source answered");
                return Ok(Some(response));
            }
        }
        Err(DataSourceError::NoDataSource {
            query_name: query_name.to_string(),
        })
    }
}
