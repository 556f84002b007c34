use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{DataSource, DataSourceError, QueryResponse, QueryTarget, Variables};
use crate::async_client::{AsyncQueryRequest, AsyncQuerySubmitter};
use crate::continuation::{AsyncResultMetadata, ContinuationToken};
use crate::metrics::METRICS;
use crate::obs;

/// Enqueues queries for out-of-band execution.
///
/// Answers every query with [`QueryResponse::AsyncRequestMade`] after
/// submitting it together with a continuation token that captures `state`
/// plus the name of the submitted query. Only one query may be in flight per
/// evaluation; asking for a second, different one fails with
/// [`DataSourceError::AsyncQueryInFlight`]. Asking again for the query already
/// in flight does not resubmit it.
///
/// When restricted with [`AsyncDataSource::with_query_names`], other queries
/// are declined.
pub struct AsyncDataSource {
    submitter: Arc<dyn AsyncQuerySubmitter>,
    target: QueryTarget,
    state: AsyncResultMetadata,
    query_names: BTreeSet<String>,
    in_flight: Mutex<Option<String>>,
}

impl AsyncDataSource {
    pub fn new(
        submitter: Arc<dyn AsyncQuerySubmitter>,
        target: QueryTarget,
        state: AsyncResultMetadata,
    ) -> Self {
        Self {
            submitter,
            target,
            state,
            query_names: BTreeSet::new(),
            in_flight: Mutex::new(None),
        }
    }

    /// Only enqueue these queries.
    pub fn with_query_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query_names.extend(names.into_iter().map(Into::into));
        self
    }

    fn answers(&self, query_name: &str) -> bool {
        self.query_names.is_empty() || self.query_names.contains(query_name)
    }

    /// Name of the query submitted by this source, if any.
    pub fn in_flight(&self) -> Option<String> {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Claim the in-flight slot. `Ok(false)` when `query_name` already holds it.
    fn claim(&self, query_name: &str) -> Result<bool, DataSourceError> {
        let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_deref() {
            Some(current) if current == query_name => Ok(false),
            Some(current) => Err(DataSourceError::AsyncQueryInFlight {
                in_flight: current.to_string(),
                requested: query_name.to_string(),
            }),
            None => {
                *slot = Some(query_name.to_string());
                Ok(true)
            }
        }
    }

    fn release(&self) {
        *self.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[async_trait]
impl DataSource for AsyncDataSource {
    async fn query(
        &self,
        query_name: &str,
        query: &str,
        variables: &Variables,
    ) -> Result<Option<QueryResponse>, DataSourceError> {
        if !self.answers(query_name) {
            return Ok(None);
        }
        if !self.claim(query_name)? {
            return Ok(Some(QueryResponse::AsyncRequestMade));
        }

        let token = match ContinuationToken::new(self.state.with_in_flight(query_name)).encode() {
            Ok(token) => token,
            Err(err) => {
                self.release();
                return Err(err.into());
            }
        };
        let request = AsyncQueryRequest::new(query_name, query, variables, token);

        if let Err(err) = self.submitter.submit(&self.target, &request).await {
            self.release();
            return Err(err.into());
        }

        METRICS.inc_async_queries_submitted();
        obs::emit_async_query_submitted(query_name, &request.name);
        Ok(Some(QueryResponse::AsyncRequestMade))
    }
}
