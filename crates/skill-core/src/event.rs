//! Inbound event contract.
//!
//! Every POST to a skill carries one `SkillEvent`. The `context` holds exactly
//! one of the four delivery kinds; its `name` routes the event to a handler.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::{Value, ValueMap};

/// Skill identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillRef {
    pub namespace: String,
    pub name: String,
    pub version: String,
}

/// Callback URLs for one execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Urls {
    /// Status reports are PATCHed here.
    pub execution: String,
    #[serde(default)]
    pub logs: String,
    /// Entities are POSTed here.
    pub transactions: String,
    /// GraphQL endpoint; `:enqueue` is appended for async queries.
    pub query: String,
}

/// One named configuration parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterValue {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

/// A resolved skill configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ParameterValue>,
}

impl Configuration {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.push(ParameterValue {
            name: name.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    pub fn string_parameter(&self, name: &str) -> Option<&str> {
        self.parameter(name).and_then(Value::as_str)
    }

    /// All parameters as a name → value map. Later duplicates win.
    pub fn parameter_map(&self) -> ValueMap {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect()
    }
}

/// Transaction metadata delivered with a subscription result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionMetadata {
    #[serde(default)]
    pub tx: i64,
    #[serde(default)]
    pub after_basis_t: i64,
}

/// A subscription delivery: a list of fact tuples.
///
/// Policy subscriptions deliver tuples shaped `[commonFacts, [storageId, configHash]]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionContext {
    pub name: String,
    #[serde(default)]
    pub configuration: Configuration,
    #[serde(default)]
    pub result: Vec<Vec<Value>>,
    #[serde(default)]
    pub metadata: SubscriptionMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookContext {
    pub name: String,
    #[serde(default)]
    pub configuration: Configuration,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub url: String,
}

/// A synchronous request; the handler answers in the HTTP response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncRequestContext {
    pub name: String,
    #[serde(default)]
    pub configurations: Vec<Configuration>,
    #[serde(default)]
    pub metadata: Value,
}

/// A GraphQL error entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Value>,
}

/// GraphQL response envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphqlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

/// Result of an out-of-band query, delivered as a new event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AsyncQueryResultContext {
    pub name: String,
    #[serde(default)]
    pub configuration: Configuration,
    /// Continuation token supplied when the query was enqueued.
    #[serde(default)]
    pub metadata: String,
    #[serde(default)]
    pub result: GraphqlResponse,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_request: Option<SyncRequestContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_query_result: Option<AsyncQueryResultContext>,
}

/// The inbound event payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillEvent {
    pub execution_id: String,
    pub skill: SkillRef,
    pub workspace_id: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    pub context: EventContext,
    pub urls: Urls,
    #[serde(default)]
    pub token: String,
}

impl SkillEvent {
    /// The subscription, webhook, request or async query name carried by the context.
    pub fn name(&self) -> Option<&str> {
        let ctx = &self.context;
        ctx.subscription
            .as_ref()
            .map(|s| s.name.as_str())
            .or_else(|| ctx.webhook.as_ref().map(|w| w.name.as_str()))
            .or_else(|| ctx.sync_request.as_ref().map(|r| r.name.as_str()))
            .or_else(|| ctx.async_query_result.as_ref().map(|a| a.name.as_str()))
    }
}
