use async_trait::async_trait;
use skill_state::{ObjectStore, PutOutcome, StorageError};

use super::differ::StorageId;
use super::goal::GoalEvaluationQueryResult;
use crate::error::SkillError;

/// Persists result lists keyed by their storage id.
#[async_trait]
pub trait EvaluationStorage: Send + Sync {
    /// Write-once: storing under an existing id succeeds without overwriting.
    async fn store(
        &self,
        results: &[GoalEvaluationQueryResult],
        storage_id: &StorageId,
    ) -> Result<PutOutcome, SkillError>;

    async fn retrieve(
        &self,
        storage_id: &StorageId,
    ) -> Result<Vec<GoalEvaluationQueryResult>, SkillError>;
}

/// Stores JSON-encoded result lists in an [`ObjectStore`].
pub struct ObjectEvaluationStorage<S> {
    store: S,
}

impl<S: ObjectStore> ObjectEvaluationStorage<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }
}

fn object_key(storage_id: &StorageId) -> Result<&str, StorageError> {
    match storage_id {
        StorageId::Hash(hash) => Ok(hash.as_str()),
        sentinel => Err(StorageError::InvalidKey {
            key: sentinel.to_string(),
        }),
    }
}

#[async_trait]
impl<S: ObjectStore> EvaluationStorage for ObjectEvaluationStorage<S> {
    async fn store(
        &self,
        results: &[GoalEvaluationQueryResult],
        storage_id: &StorageId,
    ) -> Result<PutOutcome, SkillError> {
        let key = object_key(storage_id)?;
        let data = serde_json::to_vec(results)?;
        Ok(self.store.put_if_absent(key, &data).await?)
    }

    async fn retrieve(
        &self,
        storage_id: &StorageId,
    ) -> Result<Vec<GoalEvaluationQueryResult>, SkillError> {
        let key = object_key(storage_id)?;
        let data = self.store.get(key).await?;
        Ok(serde_json::from_slice(&data)?)
    }
}
