//! Policy evaluation pipeline: goals, change detection, result storage and
//! the orchestrating event handler.

pub mod differ;
pub mod entities;
pub mod goal;
pub mod handler;
pub mod storage;

pub use differ::{
    goal_configs_differ, goal_results_differ, ConfigDiff, PreviousResult, ResultsDiff, StorageId,
    NOT_AVAILABLE, NO_DATA,
};
pub use entities::{create_entity_from_results, should_retract, EvaluationOutcome};
pub use goal::{
    EvaluationContext, EvaluatorRegistry, EvaluatorSelector, Goal, GoalEvaluationQueryResult,
    GoalEvaluator,
};
pub use handler::{PolicyHandler, PolicyHandlerBuilder, EVALUATE_GOALS_LOCALLY};
pub use storage::{EvaluationStorage, ObjectEvaluationStorage};
