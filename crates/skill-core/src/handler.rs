//! Handler seam between the listener and skill logic.

use std::sync::Arc;

use async_trait::async_trait;

use crate::event::SkillEvent;
use crate::status::Status;
use crate::transact::{Transaction, Transactor};

/// Everything a handler needs for one execution.
#[derive(Clone)]
pub struct RequestContext {
    pub event: SkillEvent,
    pub transactor: Arc<dyn Transactor>,
    /// Shared client for outbound queries.
    pub http: reqwest::Client,
}

impl RequestContext {
    pub fn new(event: SkillEvent, transactor: Arc<dyn Transactor>, http: reqwest::Client) -> Self {
        Self {
            event,
            transactor,
            http,
        }
    }

    pub fn new_transaction(&self) -> Transaction<'_> {
        Transaction::new(self.transactor.as_ref())
    }
}

/// Handles one routed event and reports its outcome as a [`Status`].
///
/// Handlers do not fail: every error is converted into a status.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, ctx: RequestContext) -> Status;
}
