//! HTTP listener.
//!
//! Every POST to `/` carries one event. The listener always answers
//! `201 Created`: undecodable or unrouted payloads get an empty body, and the
//! real outcome of a handled event travels out of band as a status report
//! sent before the response. Only synchronous requests get a response body.

use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::FutureExt;
use tracing::{info, warn, Instrument};

use crate::backend::{HttpBackend, SkillBackend};
use crate::config::SkillConfig;
use crate::event::SkillEvent;
use crate::handler::{EventHandler, RequestContext};
use crate::metrics::METRICS;
use crate::obs;
use crate::status::Status;
use crate::telemetry::init_tracing;

/// A set of named event handlers plus the backend they report to.
#[derive(Clone)]
pub struct Skill {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
    backend: Arc<dyn SkillBackend>,
}

impl Default for Skill {
    fn default() -> Self {
        Self::new(Arc::new(HttpBackend::default()))
    }
}

impl Skill {
    pub fn new(backend: Arc<dyn SkillBackend>) -> Self {
        Self {
            handlers: HashMap::new(),
            backend,
        }
    }

    /// Route events named `name` to `handler`. A later registration wins.
    pub fn handler(mut self, name: &str, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.insert(name.to_string(), handler);
        self
    }

    /// Route every name in `names` to the same handler.
    pub fn handler_for<I, S>(mut self, names: I, handler: Arc<dyn EventHandler>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.handlers.insert(name.into(), handler.clone());
        }
        self
    }

    pub fn handles(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/", post(receive))
            .with_state(Arc::new(self))
    }

    /// Run the handler, report its status and return it.
    async fn execute(&self, handler: Arc<dyn EventHandler>, event: SkillEvent) -> Status {
        let ctx = RequestContext::new(
            event.clone(),
            self.backend.transactor(&event),
            self.backend.http_client(),
        );

        let status = match AssertUnwindSafe(handler.handle(ctx)).catch_unwind().await {
            Ok(status) => status,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(panic = %message, "handler panicked");
                Status::failed(format!("handler panicked: {message}"))
            }
        };

        if let Err(err) = self.backend.report_status(&event, &status).await {
            warn!(error = %err, "failed to report status");
        }
        info!(state = ?status.state, reason = %status.reason, "execution finished");
        METRICS.flush();
        status
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn receive(State(skill): State<Arc<Skill>>, body: Bytes) -> Response {
    let event: SkillEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, bytes = body.len(), "ignoring undecodable payload");
            return StatusCode::CREATED.into_response();
        }
    };

    let Some(name) = event.name().map(str::to_string) else {
        warn!(execution_id = %event.execution_id, "ignoring event without a name");
        return StatusCode::CREATED.into_response();
    };
    let Some(handler) = skill.handlers.get(&name).cloned() else {
        warn!(event_name = %name, "no handler registered");
        return StatusCode::CREATED.into_response();
    };

    let span = obs::execution_span(&event.execution_id, &event.workspace_id, &name);
    let status = skill.execute(handler, event).instrument(span).await;

    match status.sync_request {
        Some(body) => (StatusCode::CREATED, Json(body)).into_response(),
        None => StatusCode::CREATED.into_response(),
    }
}

/// Serve `skill` on `0.0.0.0:<port>` until the process exits.
pub async fn start(skill: Skill, config: &SkillConfig) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(addr = %addr, environment = %config.environment, "skill listening");
    axum::serve(listener, skill.router())
        .await
        .context("server terminated")?;
    Ok(())
}

/// Read configuration from the environment, initialise tracing and serve.
pub async fn run(skill: Skill) -> anyhow::Result<()> {
    let config = SkillConfig::from_env();
    init_tracing(&config.tracing());
    start(skill, &config).await
}
