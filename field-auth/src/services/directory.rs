use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;

use super::error::DirectoryError;
use crate::models::Identity;

/// Identity records keyed by phone number and user id.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Returns the identity for `phone_number`, creating an active one if none exists.
    /// `authenticated_at` is only written to a newly created identity; an
    /// existing one is returned untouched.
    async fn get_or_create(
        &self,
        phone_number: &str,
        authenticated_at: DateTime<Utc>,
    ) -> Result<Identity, DirectoryError>;

    async fn find_by_id(&self, user_id: &str) -> Result<Option<Identity>, DirectoryError>;

    async fn record_authentication(
        &self,
        user_id: &str,
        authenticated_at: DateTime<Utc>,
    ) -> Result<Identity, DirectoryError>;

    async fn health_check(&self) -> Result<(), DirectoryError>;
}

/// Process-local directory.
#[derive(Clone, Default)]
pub struct InMemoryUserDirectory {
    by_phone: Arc<DashMap<String, Identity>>,
    phone_by_id: Arc<DashMap<String, String>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate or deactivate an identity.
    pub fn set_active(&self, user_id: &str, is_active: bool) -> Result<(), DirectoryError> {
        let phone = self.phone_for(user_id)?;
        let mut identity = self
            .by_phone
            .get_mut(&phone)
            .ok_or_else(|| DirectoryError::NotFound(user_id.to_string()))?;
        identity.is_active = is_active;
        tracing::info!(user_id = %user_id, is_active, "Identity activation changed");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.by_phone.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_phone.is_empty()
    }

    fn phone_for(&self, user_id: &str) -> Result<String, DirectoryError> {
        self.phone_by_id
            .get(user_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DirectoryError::NotFound(user_id.to_string()))
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_or_create(
        &self,
        phone_number: &str,
        authenticated_at: DateTime<Utc>,
    ) -> Result<Identity, DirectoryError> {
        let identity = match self.by_phone.entry(phone_number.to_string()) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => {
                let identity = Identity::new(phone_number.to_string(), authenticated_at);
                self.phone_by_id
                    .insert(identity.id.clone(), phone_number.to_string());
                tracing::info!(user_id = %identity.id, "Created identity on first verification");
                slot.insert(identity).clone()
            }
        };
        Ok(identity)
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<Identity>, DirectoryError> {
        let Some(phone) = self.phone_by_id.get(user_id).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        Ok(self.by_phone.get(&phone).map(|e| e.value().clone()))
    }

    async fn record_authentication(
        &self,
        user_id: &str,
        authenticated_at: DateTime<Utc>,
    ) -> Result<Identity, DirectoryError> {
        let phone = self.phone_for(user_id)?;
        let mut identity = self
            .by_phone
            .get_mut(&phone)
            .ok_or_else(|| DirectoryError::NotFound(user_id.to_string()))?;
        identity.last_authenticated_at = authenticated_at;
        Ok(identity.clone())
    }

    async fn health_check(&self) -> Result<(), DirectoryError> {
        Ok(())
    }
}
