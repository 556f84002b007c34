use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::continuation::EvaluationMetadata;
use crate::datasource::{DataSource, DataSourceError, QueryResponse, Variables};
use crate::error::SkillError;
use crate::event::Configuration;
use crate::value::ValueMap;

/// Parameter naming the goal definition a configuration instantiates.
pub const DEFINITION_NAME_PARAMETER: &str = "definitionName";

/// One evaluation unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Goal {
    pub definition: String,
    pub configuration: String,
    pub args: ValueMap,
}

impl Goal {
    pub fn from_configuration(configuration: &Configuration) -> Result<Self, SkillError> {
        let definition = configuration
            .string_parameter(DEFINITION_NAME_PARAMETER)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| SkillError::MissingParameter {
                name: DEFINITION_NAME_PARAMETER.to_string(),
            })?;
        Ok(Self {
            definition: definition.to_string(),
            configuration: configuration.name.clone(),
            args: configuration.parameter_map(),
        })
    }
}

/// One finding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalEvaluationQueryResult {
    #[serde(default)]
    pub details: ValueMap,
}

impl GoalEvaluationQueryResult {
    pub fn new(details: ValueMap) -> Self {
        Self { details }
    }
}

/// What an evaluator sees.
pub struct EvaluationContext<'a> {
    pub data_source: &'a dyn DataSource,
    pub metadata: &'a EvaluationMetadata,
    /// Identifier the evaluation is scoped to, usually an image digest.
    pub subject: &'a str,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(
        data_source: &'a dyn DataSource,
        metadata: &'a EvaluationMetadata,
        subject: &'a str,
    ) -> Self {
        Self {
            data_source,
            metadata,
            subject,
        }
    }

    /// Run a query; a source declining is reported as `NoDataSource`.
    pub async fn query(
        &self,
        query_name: &str,
        query: &str,
        variables: &Variables,
    ) -> Result<QueryResponse, DataSourceError> {
        self.data_source
            .query(query_name, query, variables)
            .await?
            .ok_or_else(|| DataSourceError::NoDataSource {
                query_name: query_name.to_string(),
            })
    }
}

/// Evaluates one goal definition.
///
/// `Ok(None)` means no data. When a query answers `AsyncRequestMade` the
/// evaluator should stop and return whatever it has; the orchestrator notices
/// the pending query and discards the partial result.
#[async_trait]
pub trait GoalEvaluator: Send + Sync {
    async fn evaluate_goal(
        &self,
        ctx: &EvaluationContext<'_>,
        goal: &Goal,
    ) -> Result<Option<Vec<GoalEvaluationQueryResult>>, SkillError>;

    /// Excluded from local evaluation.
    fn skip_local(&self) -> bool {
        false
    }
}

pub trait EvaluatorSelector: Send + Sync {
    fn select(&self, goal: &Goal) -> Result<Arc<dyn GoalEvaluator>, SkillError>;
}

/// Definition name → evaluator.
#[derive(Clone, Default)]
pub struct EvaluatorRegistry {
    evaluators: HashMap<String, Arc<dyn GoalEvaluator>>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, definition: &str, evaluator: Arc<dyn GoalEvaluator>) -> Self {
        self.evaluators.insert(definition.to_string(), evaluator);
        self
    }

    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }
}

impl EvaluatorSelector for EvaluatorRegistry {
    fn select(&self, goal: &Goal) -> Result<Arc<dyn GoalEvaluator>, SkillError> {
        self.evaluators
            .get(&goal.definition)
            .cloned()
            .ok_or_else(|| SkillError::UnknownEvaluator {
                definition: goal.definition.clone(),
            })
    }
}
