//! Change detection for evaluation results and goal configuration.
//!
//! Both comparisons hash order-insensitively (see [`crate::digest`]) and are
//! pure apart from logging.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use super::goal::GoalEvaluationQueryResult;
use crate::digest::{digest_of, sha256_hex, DigestError};
use crate::event::Configuration;
use crate::value::{Value, ValueMap};

/// Wire value for "no previous result".
pub const NOT_AVAILABLE: &str = "n/a";
/// Wire value for "the previous result was empty".
pub const NO_DATA: &str = "no-data";

/// Parameters that only affect presentation and never trigger re-evaluation.
pub const EXCLUDED_PARAMETERS: &[&str] = &[
    "name",
    "description",
    "displayName",
    "remediationLink",
    "resultType",
    "detailsOrder",
];

/// Identifier of a stored result list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum StorageId {
    #[default]
    NotAvailable,
    NoData,
    Hash(String),
}

impl StorageId {
    /// True for content hashes, false for both sentinels.
    pub fn is_hash(&self) -> bool {
        matches!(self, StorageId::Hash(_))
    }
}

impl FromStr for StorageId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            NOT_AVAILABLE => StorageId::NotAvailable,
            NO_DATA => StorageId::NoData,
            hash => StorageId::Hash(hash.to_string()),
        })
    }
}

impl From<&str> for StorageId {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(id) => id,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageId::NotAvailable => f.write_str(NOT_AVAILABLE),
            StorageId::NoData => f.write_str(NO_DATA),
            StorageId::Hash(hash) => f.write_str(hash),
        }
    }
}

impl Serialize for StorageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StorageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(StorageId::from(raw.as_str()))
    }
}

/// Storage id and config hash recorded by the previous evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviousResult {
    pub storage_id: StorageId,
    pub config_hash: String,
}

impl Default for PreviousResult {
    fn default() -> Self {
        Self {
            storage_id: StorageId::NotAvailable,
            config_hash: NOT_AVAILABLE.to_string(),
        }
    }
}

impl PreviousResult {
    /// Read the `[storageId, configHash]` element of a subscription tuple.
    pub fn from_tuple(tuple: &[Value]) -> Self {
        let ids = tuple.get(1).and_then(Value::as_list).unwrap_or_default();
        let field = |i: usize| ids.get(i).and_then(Value::as_str).unwrap_or(NOT_AVAILABLE);
        Self {
            storage_id: StorageId::from(field(0)),
            config_hash: field(1).to_string(),
        }
    }

    /// Prefer the first tuple that carries a previous result.
    pub fn select(tuples: &[Vec<Value>]) -> Self {
        let mut candidates = tuples.iter().map(|t| Self::from_tuple(t));
        let first = candidates.next().unwrap_or_default();
        if first.storage_id != StorageId::NotAvailable {
            return first;
        }
        candidates
            .find(|p| p.storage_id != StorageId::NotAvailable)
            .unwrap_or(first)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsDiff {
    pub differs: bool,
    pub storage_id: StorageId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDiff {
    pub differs: bool,
    pub config_hash: String,
}

/// Compare fresh results against the previous storage id.
///
/// Absent results map to [`StorageId::NoData`]. Every result list, including
/// an empty one, is hashed.
pub fn goal_results_differ(
    results: Option<&[GoalEvaluationQueryResult]>,
    subject: &str,
    previous: &StorageId,
) -> Result<ResultsDiff, DigestError> {
    let storage_id = match results {
        None => StorageId::NoData,
        Some(results) => StorageId::Hash(digest_of(&results)?),
    };
    let differs = storage_id != *previous;
    debug!(subject = %subject, storage_id = %storage_id, previous = %previous, differs, "results compared");
    Ok(ResultsDiff {
        differs,
        storage_id,
    })
}

/// The parameters that take part in the config hash.
pub fn relevant_parameters(configuration: &Configuration) -> ValueMap {
    let mut params = configuration.parameter_map();
    params.retain(|name, _| !EXCLUDED_PARAMETERS.contains(&name.as_str()));
    params
}

/// Compare the relevant configuration against the previous config hash.
pub fn goal_configs_differ(
    configuration: &Configuration,
    subject: &str,
    previous_hash: &str,
) -> Result<ConfigDiff, DigestError> {
    let config_hash = digest_of(&relevant_parameters(configuration))?;
    let differs = config_hash != previous_hash;
    debug!(subject = %subject, config_hash = %config_hash, previous = %previous_hash, differs, "configuration compared");
    Ok(ConfigDiff {
        differs,
        config_hash,
    })
}

/// Order-sensitive stand-in used when canonical hashing fails.
pub fn fallback_digest<T: fmt::Debug + ?Sized>(value: &T) -> String {
    sha256_hex(format!("{value:?}").as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn finding(id: &str, severity: &str) -> GoalEvaluationQueryResult {
        let details: ValueMap = Value::from(json!({"id": id, "severity": severity}))
            .decode()
            .unwrap();
        GoalEvaluationQueryResult::new(details)
    }

    #[test]
    fn result_order_does_not_change_storage_id() {
        let a = vec![finding("CVE-1", "high"), finding("CVE-2", "low"), finding("CVE-3", "critical")];
        let mut b = a.clone();
        b.reverse();
        let c = vec![a[1].clone(), a[2].clone(), a[0].clone()];

        let prev = StorageId::NotAvailable;
        let da = goal_results_differ(Some(a.as_slice()), "s", &prev).unwrap();
        let db = goal_results_differ(Some(b.as_slice()), "s", &prev).unwrap();
        let dc = goal_results_differ(Some(c.as_slice()), "s", &prev).unwrap();
        assert!(da.storage_id.is_hash());
        assert_eq!(da.storage_id, db.storage_id);
        assert_eq!(da.storage_id, dc.storage_id);
    }

    #[test]
    fn sentinels_are_distinct() {
        let from_na = goal_results_differ(None, "s", &StorageId::NotAvailable).unwrap();
        assert!(from_na.differs);
        assert_eq!(from_na.storage_id, StorageId::NoData);

        let from_no_data = goal_results_differ(None, "s", &StorageId::NoData).unwrap();
        assert!(!from_no_data.differs);
        assert_eq!(from_no_data.storage_id.to_string(), "no-data");
    }

    #[test]
    fn empty_results_are_hashed_not_no_data() {
        let empty: &[GoalEvaluationQueryResult] = &[];
        let diff = goal_results_differ(Some(empty), "s", &StorageId::NoData).unwrap();
        assert!(diff.storage_id.is_hash());
        assert!(diff.differs);

        let nonempty = vec![finding("CVE-1", "high")];
        let other = goal_results_differ(Some(nonempty.as_slice()), "s", &StorageId::NoData).unwrap();
        assert_ne!(diff.storage_id, other.storage_id);

        let again = goal_results_differ(Some(empty), "s", &diff.storage_id).unwrap();
        assert!(!again.differs);
    }

    #[test]
    fn same_results_do_not_differ() {
        let results = vec![finding("CVE-1", "high")];
        let first = goal_results_differ(Some(results.as_slice()), "s", &StorageId::NotAvailable).unwrap();
        let again = goal_results_differ(Some(results.as_slice()), "s", &first.storage_id).unwrap();
        assert!(!again.differs);
    }

    #[test]
    fn presentation_parameters_are_ignored() {
        let base = Configuration::new("default")
            .with_parameter("definitionName", "no-critical")
            .with_parameter("threshold", 7i64);
        let decorated = base
            .clone()
            .with_parameter("displayName", "No critical CVEs")
            .with_parameter("description", "Blocks images with critical CVEs");

        let a = goal_configs_differ(&base, "s", NOT_AVAILABLE).unwrap();
        let b = goal_configs_differ(&decorated, "s", &a.config_hash).unwrap();
        assert!(a.differs);
        assert!(!b.differs);
        assert_eq!(a.config_hash, b.config_hash);

        let changed = base.with_parameter("threshold", 8i64);
        assert!(goal_configs_differ(&changed, "s", &a.config_hash).unwrap().differs);
    }

    #[test]
    fn storage_id_wire_form() {
        assert_eq!(StorageId::from("n/a"), StorageId::NotAvailable);
        assert_eq!(StorageId::from("no-data"), StorageId::NoData);
        assert_eq!(StorageId::from("abc"), StorageId::Hash("abc".into()));
        assert_ne!(StorageId::from(""), StorageId::NotAvailable);
        assert_eq!(serde_json::to_value(StorageId::NoData).unwrap(), json!("no-data"));
    }

    #[test]
    fn previous_result_prefers_real_ids() {
        let tuples = vec![
            vec![Value::from(json!({})), Value::from(json!(["n/a", "n/a"]))],
            vec![Value::from(json!({})), Value::from(json!(["abc", "cfg"]))],
        ];
        let previous = PreviousResult::select(&tuples);
        assert_eq!(previous.storage_id, StorageId::Hash("abc".into()));
        assert_eq!(previous.config_hash, "cfg");

        assert_eq!(PreviousResult::select(&[]), PreviousResult::default());
    }
}
