//! Structured observability hooks for skill executions.
//!
//! Every handler invocation runs inside an execution span carrying the
//! execution id, workspace and event name; the `emit_*` functions record the
//! evaluation lifecycle as `info!` events with an `event` field.

use tracing::{info, warn, Span};

/// Span covering one handler invocation.
pub fn execution_span(execution_id: &str, workspace_id: &str, event_name: &str) -> Span {
    tracing::info_span!(
        "skill.execution",
        execution_id = %execution_id,
        workspace_id = %workspace_id,
        event_name = %event_name,
    )
}

pub fn emit_evaluation_started(definition: &str, configuration: &str, subject: &str) {
    info!(
        event = "evaluation.started",
        definition = %definition,
        configuration = %configuration,
        subject = %subject,
    );
}

pub fn emit_evaluation_finished(definition: &str, storage_id: &str, deviations: usize, changed: bool) {
    info!(
        event = "evaluation.finished",
        definition = %definition,
        storage_id = %storage_id,
        deviations = deviations,
        changed = changed,
    );
}

pub fn emit_async_query_submitted(query_name: &str, result_event: &str) {
    info!(event = "async_query.submitted", query_name = %query_name, result_event = %result_event);
}

pub fn emit_results_stored(storage_id: &str, created: bool) {
    info!(event = "results.stored", storage_id = %storage_id, created = created);
}

/// Hashing failed; evaluation continues as if results changed.
pub fn emit_diff_failed(what: &str, error: &dyn std::fmt::Display) {
    warn!(event = "diff.failed", what = %what, error = %error);
}
