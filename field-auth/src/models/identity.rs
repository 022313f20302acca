//! Identity model - a field worker known by phone number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity record owned by the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub phone_number: String,
    pub is_active: bool,
    pub last_authenticated_at: DateTime<Utc>,
}

impl Identity {
    /// Create a new active identity for a phone number that just proved ownership.
    pub fn new(phone_number: String, authenticated_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            phone_number,
            is_active: true,
            last_authenticated_at: authenticated_at,
        }
    }
}
