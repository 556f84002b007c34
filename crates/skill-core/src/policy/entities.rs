use chrono::{DateTime, SecondsFormat, Utc};

use super::differ::StorageId;
use crate::digest::sha256_hex;
use crate::transact::{AttributeValue, Entity};
use crate::value::Value;

pub const GOAL_EVALUATION_RESULT: &str = "goal-evaluation-result";

/// Everything recorded about one finished evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationOutcome {
    pub definition: String,
    pub configuration: String,
    pub subject: String,
    pub storage_id: StorageId,
    pub config_hash: String,
    pub deviation_count: usize,
    pub created_at: DateTime<Utc>,
    pub tx: i64,
    pub should_retract: bool,
}

/// True when results disappeared: the current id is empty and the previous
/// one named stored data.
pub fn should_retract(current: &StorageId, previous: &StorageId) -> bool {
    *current == StorageId::NoData && previous.is_hash()
}

/// Stable entity id for a definition, configuration and subject.
pub fn evaluation_entity_id(definition: &str, configuration: &str, subject: &str) -> String {
    sha256_hex(format!("{definition}\u{0}{configuration}\u{0}{subject}").as_bytes())
}

/// One `goal-evaluation-result` entity. On retraction, `storageId` and
/// `deviationCount` carry retract markers instead of values.
pub fn create_entity_from_results(outcome: &EvaluationOutcome) -> Entity {
    let (storage_id, deviation_count) = if outcome.should_retract {
        (AttributeValue::Retract, AttributeValue::Retract)
    } else {
        (
            AttributeValue::set(outcome.storage_id.to_string()),
            AttributeValue::set(outcome.deviation_count as u64),
        )
    };

    Entity::new(
        GOAL_EVALUATION_RESULT,
        &evaluation_entity_id(&outcome.definition, &outcome.configuration, &outcome.subject),
    )
    .with_attribute("definition", AttributeValue::set(outcome.definition.as_str()))
    .with_attribute("configuration", AttributeValue::set(outcome.configuration.as_str()))
    .with_attribute("subject", AttributeValue::set(outcome.subject.as_str()))
    .with_attribute("storageId", storage_id)
    .with_attribute("configHash", AttributeValue::set(outcome.config_hash.as_str()))
    .with_attribute("deviationCount", deviation_count)
    .with_attribute(
        "createdAt",
        Value::from(outcome.created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    )
    .with_attribute("tx", AttributeValue::set(outcome.tx))
}
