//! Verification code lifecycle: generation, storage, validation and sweeping.
//!
//! Policy: a code that matches stays valid until its TTL elapses. It is not
//! consumed on success, so the same id/code pair can be verified again within
//! the TTL.

use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, Rng};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::clock::Clock;
use super::code_storage::CodeStorage;
use super::error::StorageError;
use crate::config::{VerificationConfig, MAX_CODE_LENGTH, MAX_CODE_TTL_MINUTES, MIN_CODE_LENGTH};
use crate::models::VerificationRecord;

/// Upper bound on fresh ids tried before giving up on an insert.
pub const MAX_ID_ATTEMPTS: usize = 5;

pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Clone)]
pub struct VerificationCodeStore {
    storage: Arc<dyn CodeStorage>,
    clock: Arc<dyn Clock>,
    code_length: usize,
    code_ttl: Duration,
    id_generator: IdGenerator,
}

impl VerificationCodeStore {
    /// Code length and lifetime outside the accepted configuration range are
    /// clamped into it.
    pub fn new(
        storage: Arc<dyn CodeStorage>,
        clock: Arc<dyn Clock>,
        config: &VerificationConfig,
    ) -> Self {
        let code_length = config.code_length.clamp(MIN_CODE_LENGTH, MAX_CODE_LENGTH);
        let code_ttl_minutes = config.code_ttl_minutes.clamp(1, MAX_CODE_TTL_MINUTES);
        if code_length != config.code_length || code_ttl_minutes != config.code_ttl_minutes {
            tracing::warn!(
                code_length,
                code_ttl_minutes,
                "Verification settings out of range, clamped"
            );
        }

        Self {
            storage,
            clock,
            code_length,
            code_ttl: Duration::minutes(code_ttl_minutes),
            id_generator: Arc::new(|| Uuid::new_v4().to_string()),
        }
    }

    /// Replace the verification id source.
    pub fn with_id_generator(mut self, id_generator: IdGenerator) -> Self {
        self.id_generator = id_generator;
        self
    }

    pub fn code_length(&self) -> usize {
        self.code_length
    }

    pub fn code_ttl(&self) -> Duration {
        self.code_ttl
    }

    /// Uniformly random, zero-padded numeric code from the OS CSPRNG.
    pub fn generate_code(&self) -> String {
        let upper = 10u64.pow(self.code_length as u32);
        let value = OsRng.gen_range(0..upper);
        format!("{:0width$}", value, width = self.code_length)
    }

    /// Stores `code` for `phone_number` and returns the new verification id.
    pub async fn store_code(&self, phone_number: &str, code: &str) -> Result<String, StorageError> {
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(self.code_ttl)
            .ok_or(StorageError::ExpiryOutOfRange)?;

        for attempt in 1..=MAX_ID_ATTEMPTS {
            let verification_id = (self.id_generator)();
            let record = VerificationRecord {
                verification_id: verification_id.clone(),
                phone_number: phone_number.to_string(),
                code: code.to_string(),
                expires_at,
            };

            if self.storage.insert_if_absent(record).await? {
                tracing::debug!(verification_id = %verification_id, expires_at = %expires_at, "Verification code stored");
                return Ok(verification_id);
            }

            tracing::warn!(attempt, "Verification id collision, retrying with a fresh id");
        }

        tracing::error!(attempts = MAX_ID_ATTEMPTS, "Could not allocate a unique verification id");
        Err(StorageError::IdSpaceExhausted(MAX_ID_ATTEMPTS))
    }

    /// True when the id exists, has not expired and the code matches.
    /// Expired records are purged on access.
    pub async fn validate_code(&self, verification_id: &str, code: &str) -> Result<bool, StorageError> {
        Ok(self.live_record(verification_id).await?.is_some_and(|record| codes_match(&record.code, code)))
    }

    /// Like [`Self::validate_code`], but the record must also belong to `phone_number`.
    pub async fn validate_code_for_phone(
        &self,
        verification_id: &str,
        phone_number: &str,
        code: &str,
    ) -> Result<bool, StorageError> {
        Ok(self.live_record(verification_id).await?.is_some_and(|record| {
            let code_ok = codes_match(&record.code, code);
            code_ok && record.phone_number == phone_number
        }))
    }

    /// The stored record, if it exists and has not expired.
    pub async fn find_live(&self, verification_id: &str) -> Result<Option<VerificationRecord>, StorageError> {
        self.live_record(verification_id).await
    }

    /// Expiry of a stored record, whether or not it has already lapsed.
    pub async fn get_expiration(&self, verification_id: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
        Ok(self.storage.get(verification_id).await?.map(|r| r.expires_at))
    }

    /// Deletes every record that expired before now and returns how many went.
    ///
    /// Ids are snapshotted first and removed one by one; an id removed
    /// concurrently in the meantime is skipped.
    pub async fn sweep_expired(&self) -> Result<usize, StorageError> {
        let now = self.clock.now();
        let expired = self.storage.expired_ids(now).await?;

        let mut removed = 0;
        for verification_id in &expired {
            if self.storage.remove_if_expired(verification_id, now).await? {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!(removed, "Swept expired verification codes");
        }
        Ok(removed)
    }

    async fn live_record(&self, verification_id: &str) -> Result<Option<VerificationRecord>, StorageError> {
        let Some(record) = self.storage.get(verification_id).await? else {
            return Ok(None);
        };

        let now = self.clock.now();
        if record.is_expired_at(now) {
            self.storage.remove_if_expired(verification_id, now).await?;
            tracing::debug!(verification_id = %verification_id, "Expired verification code evicted on access");
            return Ok(None);
        }

        Ok(Some(record))
    }
}

fn codes_match(expected: &str, supplied: &str) -> bool {
    expected.as_bytes().ct_eq(supplied.as_bytes()).into()
}
