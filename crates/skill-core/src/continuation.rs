//! Continuation state carried across stateless invocations.
//!
//! When an evaluation enqueues an async query, everything needed to resume it
//! is encoded into a [`ContinuationToken`] and handed to the backend with the
//! query. The backend returns the token verbatim on the result event, and the
//! handler rebuilds the evaluation from it. Nothing is kept in process memory.
//!
//! Wire form: base64 (standard alphabet) of the token's JSON. The `version`
//! field is checked before the rest of the payload is decoded, so a token
//! written by an incompatible schema is rejected instead of misread.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Current token schema version.
pub const CONTINUATION_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ContinuationError {
    #[error("token is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("token payload is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported continuation token version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("continuation carries no in-flight query")]
    NoQueryInFlight,
}

/// Subscription-delivered facts and the transaction they were delivered in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationMetadata {
    /// Fact tuples `[commonFacts, [storageId, configHash]]`.
    #[serde(default)]
    pub subscription_result: Vec<Vec<Value>>,
    #[serde(default)]
    pub subscription_tx: i64,
}

impl EvaluationMetadata {
    pub fn new(subscription_result: Vec<Vec<Value>>, subscription_tx: i64) -> Self {
        Self {
            subscription_result,
            subscription_tx,
        }
    }

    /// Common facts of the first tuple.
    pub fn common_facts(&self) -> Option<&Value> {
        self.subscription_result.first().and_then(|t| t.first())
    }
}

/// Resumable state of one evaluation.
///
/// At most one query is in flight. A continuation merges its result under the
/// in-flight name before evaluation re-runs, so a later distinct query can be
/// enqueued without losing earlier results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncResultMetadata {
    #[serde(rename = "subscriptionResults")]
    pub evaluation: EvaluationMetadata,
    #[serde(default)]
    pub async_query_results: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_flight_query_name: Option<String>,
}

impl AsyncResultMetadata {
    pub fn new(evaluation: EvaluationMetadata) -> Self {
        Self {
            evaluation,
            async_query_results: BTreeMap::new(),
            in_flight_query_name: None,
        }
    }

    /// A copy of this state with `query_name` marked in flight.
    pub fn with_in_flight(&self, query_name: &str) -> Self {
        let mut next = self.clone();
        next.in_flight_query_name = Some(query_name.to_string());
        next
    }

    /// Record the result of the in-flight query and clear the marker.
    /// Returns the name the result was stored under.
    pub fn complete_in_flight(&mut self, result: Value) -> Result<String, ContinuationError> {
        let name = self
            .in_flight_query_name
            .take()
            .ok_or(ContinuationError::NoQueryInFlight)?;
        self.async_query_results.insert(name.clone(), result);
        Ok(name)
    }
}

/// Versioned envelope around [`AsyncResultMetadata`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuationToken {
    pub version: u32,
    pub state: AsyncResultMetadata,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

impl ContinuationToken {
    pub fn new(state: AsyncResultMetadata) -> Self {
        Self {
            version: CONTINUATION_VERSION,
            state,
        }
    }

    pub fn encode(&self) -> Result<String, ContinuationError> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }

    pub fn decode(token: &str) -> Result<Self, ContinuationError> {
        let bytes = STANDARD.decode(token.trim())?;
        let probe: VersionProbe = serde_json::from_slice(&bytes)?;
        if probe.version != CONTINUATION_VERSION {
            return Err(ContinuationError::UnsupportedVersion {
                found: probe.version,
                supported: CONTINUATION_VERSION,
            });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}
