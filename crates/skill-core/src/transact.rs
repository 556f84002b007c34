//! Fact entities and their submission.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::metrics::METRICS;
use crate::value::{OneOrMany, Value};

#[derive(Debug, thiserror::Error)]
pub enum TransactError {
    #[error("transaction rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for TransactError {
    fn from(err: reqwest::Error) -> Self {
        TransactError::Http(err.to_string())
    }
}

/// An attribute assertion or retraction.
///
/// `Set` serializes as the plain value; `Retract` as `{"retract": true}`,
/// which the backend reads as "delete the previously asserted fact".
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Set(Value),
    Retract,
}

impl AttributeValue {
    pub fn set(value: impl Into<Value>) -> Self {
        AttributeValue::Set(value.into())
    }

    pub fn is_retract(&self) -> bool {
        matches!(self, AttributeValue::Retract)
    }
}

impl From<Value> for AttributeValue {
    fn from(value: Value) -> Self {
        AttributeValue::Set(value)
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AttributeValue::Set(value) => value.serialize(serializer),
            AttributeValue::Retract => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("retract", &true)?;
                map.end()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(rename = "id")]
    pub entity_id: String,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Entity {
    pub fn new(entity_type: &str, entity_id: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}

impl From<Entity> for OneOrMany<Entity> {
    fn from(entity: Entity) -> Self {
        OneOrMany::One(entity)
    }
}

/// Submits entities for durable ingestion.
#[async_trait]
pub trait Transactor: Send + Sync {
    async fn transact(&self, entities: Vec<Entity>) -> Result<(), TransactError>;
}

/// Collects entities and submits them in one call.
pub struct Transaction<'a> {
    transactor: &'a dyn Transactor,
    entities: Vec<Entity>,
}

impl<'a> Transaction<'a> {
    pub fn new(transactor: &'a dyn Transactor) -> Self {
        Self {
            transactor,
            entities: Vec::new(),
        }
    }

    pub fn add_entities(mut self, entities: impl Into<OneOrMany<Entity>>) -> Self {
        self.entities.extend(entities.into().into_vec());
        self
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Submit the collected entities. An empty transaction is not sent.
    pub async fn transact(self) -> Result<(), TransactError> {
        if self.entities.is_empty() {
            return Ok(());
        }
        debug!(entities = self.entities.len(), "transacting");
        self.transactor.transact(self.entities).await?;
        METRICS.inc_transactions();
        Ok(())
    }
}

#[derive(Serialize)]
struct TransactBody<'a> {
    entities: &'a [Entity],
}

/// POSTs `{"entities": [...]}` to an execution's transactions URL.
pub struct HttpTransactor {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl HttpTransactor {
    pub fn new(client: reqwest::Client, url: &str, token: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
            token: token.to_string(),
        }
    }
}

#[async_trait]
impl Transactor for HttpTransactor {
    async fn transact(&self, entities: Vec<Entity>) -> Result<(), TransactError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&TransactBody {
                entities: &entities,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransactError::Rejected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<Vec<Entity>>>,
    }

    #[async_trait]
    impl Transactor for Recording {
        async fn transact(&self, entities: Vec<Entity>) -> Result<(), TransactError> {
            self.calls.lock().unwrap().push(entities);
            Ok(())
        }
    }

    #[test]
    fn retract_serializes_as_marker() {
        let entity = Entity::new("goal-evaluation-result", "e1")
            .with_attribute("deviationCount", AttributeValue::set(3i64))
            .with_attribute("storageId", AttributeValue::Retract);

        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "goal-evaluation-result",
                "id": "e1",
                "attributes": {"deviationCount": 3, "storageId": {"retract": true}}
            })
        );
    }

    #[tokio::test]
    async fn transaction_accepts_one_or_many() {
        let recording = Recording::default();
        Transaction::new(&recording)
            .add_entities(Entity::new("a", "1"))
            .add_entities(vec![Entity::new("b", "2"), Entity::new("c", "3")])
            .transact()
            .await
            .unwrap();

        let calls = recording.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 3);
    }

    #[tokio::test]
    async fn empty_transaction_is_not_sent() {
        let recording = Recording::default();
        let tx = Transaction::new(&recording);
        assert!(tx.is_empty());
        tx.transact().await.unwrap();
        assert!(recording.calls.lock().unwrap().is_empty());
    }
}
