//! Policy orchestrator.
//!
//! One handler serves three kinds of delivery:
//!
//! - a subscription result starts an evaluation from fresh facts,
//! - an async query result resumes an evaluation from its continuation token,
//! - an `evaluate_goals_locally` request evaluates offline and answers inline.
//!
//! Each invocation runs the evaluation once. If the evaluator needed an async
//! query, the invocation ends in `running` and the result event re-enters
//! through the continuation path with the answer merged in.
//!
//! Queries are answered by, in order: completed async results, offline
//! providers, the async source (restricted to the async query names), then
//! live providers.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::differ::{
    fallback_digest, goal_configs_differ, goal_results_differ, relevant_parameters, ConfigDiff,
    PreviousResult, ResultsDiff, StorageId,
};
use super::entities::{create_entity_from_results, should_retract, EvaluationOutcome};
use super::goal::{EvaluationContext, EvaluatorSelector, Goal, GoalEvaluationQueryResult};
use super::storage::EvaluationStorage;
use crate::async_client::{is_unexpected_error, result_event_name, AsyncQuerySubmitter};
use crate::continuation::{AsyncResultMetadata, ContinuationToken, EvaluationMetadata};
use crate::datasource::{
    AsyncDataSource, ChainDataSource, DataSourceProvider, FixedDataSource, QueryTarget,
};
use crate::error::SkillError;
use crate::event::{AsyncQueryResultContext, Configuration, SubscriptionContext, SyncRequestContext};
use crate::handler::{EventHandler, RequestContext};
use crate::metrics::METRICS;
use crate::obs;
use crate::status::Status;
use crate::value::Value;

/// Name of the local evaluation request.
pub const EVALUATE_GOALS_LOCALLY: &str = "evaluate_goals_locally";

/// Queries sent out of band unless configured otherwise.
pub const DEFAULT_ASYNC_QUERIES: &[&str] = &["packages", "image-details"];

/// Key path of the subject id within the common facts.
pub const DEFAULT_SUBJECT_PATH: &[&str] = &["image", "digest"];

fn failure_status(err: &SkillError) -> Status {
    warn!(error = %err, retryable = err.is_retryable(), "evaluation failed");
    if err.is_retryable() {
        Status::retryable(err.to_string())
    } else {
        Status::failed(err.to_string())
    }
}

pub struct PolicyHandlerBuilder {
    evaluators: Arc<dyn EvaluatorSelector>,
    storage: Arc<dyn EvaluationStorage>,
    providers: Vec<Arc<dyn DataSourceProvider>>,
    submitter: Option<Arc<dyn AsyncQuerySubmitter>>,
    subscriptions: Vec<String>,
    async_queries: Vec<String>,
    subject_path: Vec<String>,
}

impl PolicyHandlerBuilder {
    pub fn new(evaluators: Arc<dyn EvaluatorSelector>, storage: Arc<dyn EvaluationStorage>) -> Self {
        Self {
            evaluators,
            storage,
            providers: Vec::new(),
            submitter: None,
            subscriptions: Vec::new(),
            async_queries: DEFAULT_ASYNC_QUERIES.iter().map(|q| q.to_string()).collect(),
            subject_path: DEFAULT_SUBJECT_PATH.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Providers are consulted in registration order, except that providers
    /// that need the network are tried only after the async source.
    pub fn with_provider(mut self, provider: Arc<dyn DataSourceProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Enables async queries; without a submitter every query must be answered
    /// by a provider.
    pub fn with_async_submitter(mut self, submitter: Arc<dyn AsyncQuerySubmitter>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    pub fn with_subscription(mut self, name: &str) -> Self {
        self.subscriptions.push(name.to_string());
        self
    }

    /// Replaces the default async query names.
    pub fn with_async_queries(mut self, names: &[&str]) -> Self {
        self.async_queries = names.iter().map(|q| q.to_string()).collect();
        self
    }

    pub fn with_subject_path(mut self, path: &[&str]) -> Self {
        self.subject_path = path.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn build(self) -> PolicyHandler {
        PolicyHandler {
            evaluators: self.evaluators,
            storage: self.storage,
            providers: self.providers,
            submitter: self.submitter,
            subscriptions: self.subscriptions,
            async_queries: self.async_queries,
            subject_path: self.subject_path,
        }
    }
}

pub struct PolicyHandler {
    evaluators: Arc<dyn EvaluatorSelector>,
    storage: Arc<dyn EvaluationStorage>,
    providers: Vec<Arc<dyn DataSourceProvider>>,
    submitter: Option<Arc<dyn AsyncQuerySubmitter>>,
    subscriptions: Vec<String>,
    async_queries: Vec<String>,
    subject_path: Vec<String>,
}

/// Metadata of an `evaluate_goals_locally` request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalMetadata {
    #[serde(default)]
    subscription_result: Vec<Vec<Value>>,
    #[serde(default)]
    fixed_data: BTreeMap<String, Value>,
}

impl PolicyHandler {
    pub fn builder(
        evaluators: Arc<dyn EvaluatorSelector>,
        storage: Arc<dyn EvaluationStorage>,
    ) -> PolicyHandlerBuilder {
        PolicyHandlerBuilder::new(evaluators, storage)
    }

    /// Every event name this handler should be registered under.
    pub fn event_names(&self) -> Vec<String> {
        let mut names = self.subscriptions.clone();
        if self.submitter.is_some() {
            names.extend(self.async_queries.iter().map(|q| result_event_name(q)));
        }
        names.push(EVALUATE_GOALS_LOCALLY.to_string());
        names
    }

    fn subject(&self, metadata: &EvaluationMetadata) -> String {
        let path: Vec<&str> = self.subject_path.iter().map(String::as_str).collect();
        metadata
            .common_facts()
            .and_then(|facts| facts.pointer(&path))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    async fn handle_subscription(&self, ctx: &RequestContext, sub: &SubscriptionContext) -> Status {
        let previous = PreviousResult::select(&sub.result);
        let tuples: Vec<Vec<Value>> = sub
            .result
            .iter()
            .filter(|t| PreviousResult::from_tuple(t).storage_id == previous.storage_id)
            .cloned()
            .collect();
        let metadata = EvaluationMetadata::new(tuples, sub.metadata.tx);
        self.evaluate(ctx, &sub.configuration, AsyncResultMetadata::new(metadata))
            .await
    }

    async fn handle_async_result(
        &self,
        ctx: &RequestContext,
        result: &AsyncQueryResultContext,
    ) -> Status {
        let token = match ContinuationToken::decode(&result.metadata) {
            Ok(token) => token,
            Err(err) => return failure_status(&SkillError::from(err)),
        };

        if !result.result.errors.is_empty() {
            let messages: Vec<&str> = result
                .result
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect();
            let reason = format!("async query {} failed: {}", result.name, messages.join("; "));
            warn!(name = %result.name, reason = %reason, "async query returned errors");
            return if messages.iter().any(|m| is_unexpected_error(m)) {
                Status::retryable(reason)
            } else {
                Status::failed(reason)
            };
        }

        let mut state = token.state;
        let data = result.result.data.clone().unwrap_or_default();
        match state.complete_in_flight(data) {
            Ok(query_name) => info!(query_name = %query_name, "async result merged"),
            Err(err) => return failure_status(&SkillError::from(err)),
        }
        self.evaluate(ctx, &result.configuration, state).await
    }

    /// Shared path of subscription and continuation invocations.
    async fn evaluate(
        &self,
        ctx: &RequestContext,
        configuration: &Configuration,
        state: AsyncResultMetadata,
    ) -> Status {
        let goal = match Goal::from_configuration(configuration) {
            Ok(goal) => goal,
            Err(err) => return failure_status(&err),
        };
        let evaluator = match self.evaluators.select(&goal) {
            Ok(evaluator) => evaluator,
            Err(err) => return failure_status(&err),
        };
        let previous = PreviousResult::select(&state.evaluation.subscription_result);
        let subject = self.subject(&state.evaluation);
        obs::emit_evaluation_started(&goal.definition, &goal.configuration, &subject);

        let mut chain = ChainDataSource::default();
        if !state.async_query_results.is_empty() {
            chain.push(Arc::new(FixedDataSource::new(
                state.async_query_results.clone(),
            )));
        }
        let (local, live): (Vec<_>, Vec<_>) = self
            .providers
            .iter()
            .partition(|provider| provider.available_offline());
        for provider in &local {
            if let Some(source) = provider.data_source(ctx, &state.evaluation) {
                chain.push(source);
            }
        }
        let async_source = self.submitter.as_ref().map(|submitter| {
            Arc::new(
                AsyncDataSource::new(
                    submitter.clone(),
                    QueryTarget::from_event(&ctx.event),
                    state.clone(),
                )
                .with_query_names(self.async_queries.iter().cloned()),
            )
        });
        if let Some(source) = &async_source {
            chain.push(source.clone());
        }
        for provider in &live {
            if let Some(source) = provider.data_source(ctx, &state.evaluation) {
                chain.push(source);
            }
        }

        METRICS.inc_evaluations();
        let eval_ctx = EvaluationContext::new(&chain, &state.evaluation, &subject);
        let results = match evaluator.evaluate_goal(&eval_ctx, &goal).await {
            Ok(results) => results,
            Err(err) => return failure_status(&err),
        };

        if let Some(query_name) = async_source.and_then(|s| s.in_flight()) {
            info!(query_name = %query_name, "evaluation waiting for async query");
            return Status::running(format!("waiting for async query {query_name}"));
        }

        let results = results.as_deref();
        let ResultsDiff {
            differs: results_differ,
            storage_id,
        } = goal_results_differ(results, &subject, &previous.storage_id).unwrap_or_else(|err| {
            obs::emit_diff_failed("results", &err);
            ResultsDiff {
                differs: true,
                storage_id: match results {
                    None => StorageId::NoData,
                    Some(results) => StorageId::Hash(fallback_digest(results)),
                },
            }
        });
        let ConfigDiff {
            differs: config_differs,
            config_hash,
        } = goal_configs_differ(configuration, &subject, &previous.config_hash).unwrap_or_else(
            |err| {
                obs::emit_diff_failed("configuration", &err);
                ConfigDiff {
                    differs: true,
                    config_hash: fallback_digest(&relevant_parameters(configuration)),
                }
            },
        );

        let deviations = results.map_or(0, <[GoalEvaluationQueryResult]>::len);
        if !results_differ && !config_differs {
            obs::emit_evaluation_finished(&goal.definition, &storage_id.to_string(), deviations, false);
            return Status::completed("evaluation results unchanged");
        }

        if results_differ {
            if let (Some(results), true) = (results, storage_id.is_hash()) {
                match self.storage.store(results, &storage_id).await {
                    Ok(outcome) => {
                        METRICS.inc_results_stored();
                        obs::emit_results_stored(
                            &storage_id.to_string(),
                            outcome == skill_state::PutOutcome::Created,
                        );
                    }
                    Err(err) => return failure_status(&err),
                }
            }
        }

        let entity = create_entity_from_results(&EvaluationOutcome {
            definition: goal.definition.clone(),
            configuration: goal.configuration.clone(),
            subject: subject.clone(),
            should_retract: should_retract(&storage_id, &previous.storage_id),
            storage_id: storage_id.clone(),
            config_hash,
            deviation_count: deviations,
            created_at: Utc::now(),
            tx: state.evaluation.subscription_tx,
        });
        if let Err(err) = ctx.new_transaction().add_entities(entity).transact().await {
            return failure_status(&SkillError::from(err));
        }

        obs::emit_evaluation_finished(&goal.definition, &storage_id.to_string(), deviations, true);
        Status::completed(format!("{deviations} deviations recorded"))
    }

    async fn handle_local(&self, ctx: &RequestContext, request: &SyncRequestContext) -> Status {
        let local: LocalMetadata = if request.metadata.is_null() {
            LocalMetadata::default()
        } else {
            match request.metadata.decode() {
                Ok(local) => local,
                Err(err) => return failure_status(&SkillError::from(err)),
            }
        };
        let metadata = EvaluationMetadata::new(local.subscription_result, 0);
        let subject = self.subject(&metadata);

        let mut chain = ChainDataSource::default();
        chain.push(Arc::new(FixedDataSource::new(local.fixed_data)));
        for provider in self.providers.iter().filter(|p| p.available_offline()) {
            if let Some(source) = provider.data_source(ctx, &metadata) {
                chain.push(source);
            }
        }

        let mut evaluated = Vec::new();
        for configuration in &request.configurations {
            let entry = match self.evaluate_locally(&chain, &metadata, &subject, configuration).await {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(err) => json!({
                    "configuration": configuration.name,
                    "error": err.to_string(),
                }),
            };
            evaluated.push(entry);
        }

        Status::completed(format!("{} goals evaluated locally", evaluated.len()))
            .with_sync_request(json!({ "results": evaluated }))
    }

    /// `Ok(None)` when the evaluator opts out of local evaluation.
    async fn evaluate_locally(
        &self,
        chain: &ChainDataSource,
        metadata: &EvaluationMetadata,
        subject: &str,
        configuration: &Configuration,
    ) -> Result<Option<serde_json::Value>, SkillError> {
        let goal = Goal::from_configuration(configuration)?;
        let evaluator = self.evaluators.select(&goal)?;
        if evaluator.skip_local() {
            info!(definition = %goal.definition, "skipping local evaluation");
            return Ok(None);
        }

        METRICS.inc_evaluations();
        let eval_ctx = EvaluationContext::new(chain, metadata, subject);
        let results = evaluator.evaluate_goal(&eval_ctx, &goal).await?;
        Ok(Some(json!({
            "definition": goal.definition,
            "configuration": goal.configuration,
            "subject": subject,
            "results": results,
        })))
    }
}

#[async_trait]
impl EventHandler for PolicyHandler {
    async fn handle(&self, ctx: RequestContext) -> Status {
        let context = &ctx.event.context;
        if let Some(sub) = &context.subscription {
            return self.handle_subscription(&ctx, sub).await;
        }
        if let Some(result) = &context.async_query_result {
            return self.handle_async_result(&ctx, result).await;
        }
        match &context.sync_request {
            Some(request) if request.name == EVALUATE_GOALS_LOCALLY => {
                self.handle_local(&ctx, request).await
            }
            _ => Status::failed(format!(
                "unsupported event {}",
                ctx.event.name().unwrap_or("<unnamed>")
            )),
        }
    }
}
