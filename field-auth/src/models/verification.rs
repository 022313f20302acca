//! Verification record model - a pending phone verification code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored one-time code, keyed externally by its verification id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub verification_id: String,
    pub phone_number: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl VerificationRecord {
    /// A record is unusable from `expires_at` onwards.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
