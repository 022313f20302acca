use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;

use super::error::StorageError;
use crate::models::VerificationRecord;

/// Backing storage for verification records.
///
/// The in-process map is the default; a shared TTL store can implement this
/// trait for multi-instance deployments.
#[async_trait]
pub trait CodeStorage: Send + Sync {
    /// Inserts the record unless its id is already taken. Returns `false` on collision.
    async fn insert_if_absent(&self, record: VerificationRecord) -> Result<bool, StorageError>;

    async fn get(&self, verification_id: &str) -> Result<Option<VerificationRecord>, StorageError>;

    /// Removes the record only if it is expired at `now`. Missing ids are a no-op.
    async fn remove_if_expired(
        &self,
        verification_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// Snapshot of ids whose records expired strictly before `now`.
    async fn expired_ids(&self, now: DateTime<Utc>) -> Result<Vec<String>, StorageError>;

    async fn len(&self) -> Result<usize, StorageError>;
}

/// Sharded in-memory storage. Reads and writes lock a single shard.
#[derive(Clone, Default)]
pub struct MemoryCodeStorage {
    records: Arc<DashMap<String, VerificationRecord>>,
}

impl MemoryCodeStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CodeStorage for MemoryCodeStorage {
    async fn insert_if_absent(&self, record: VerificationRecord) -> Result<bool, StorageError> {
        match self.records.entry(record.verification_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(true)
            }
        }
    }

    async fn get(&self, verification_id: &str) -> Result<Option<VerificationRecord>, StorageError> {
        Ok(self
            .records
            .get(verification_id)
            .map(|entry| entry.value().clone()))
    }

    async fn remove_if_expired(
        &self,
        verification_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        Ok(self
            .records
            .remove_if(verification_id, |_, record| record.is_expired_at(now))
            .is_some())
    }

    async fn expired_ids(&self, now: DateTime<Utc>) -> Result<Vec<String>, StorageError> {
        Ok(self
            .records
            .iter()
            .filter(|entry| entry.value().expires_at < now)
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn len(&self) -> Result<usize, StorageError> {
        Ok(self.records.len())
    }
}
