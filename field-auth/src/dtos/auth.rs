use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RequestCodeRequest {
    #[validate(length(min = 1, max = 32, message = "Phone number is required"))]
    pub phone_number: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCodeResponse {
    pub verification_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Body of the 503 returned when a code was stored but could not be delivered.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryFailedResponse {
    pub error: String,
    pub verification_id: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResendCodeRequest {
    #[validate(length(min = 1, max = 64, message = "Verification id is required"))]
    pub verification_id: String,

    #[validate(length(min = 1, max = 32, message = "Phone number is required"))]
    pub phone_number: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeRequest {
    #[validate(length(min = 1, max = 64, message = "Verification id is required"))]
    pub verification_id: String,

    #[validate(length(min = 1, max = 32, message = "Phone number is required"))]
    pub phone_number: String,

    #[validate(length(min = 1, max = 32, message = "Code is required"))]
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    /// Seconds until `expires_at`
    pub expires_in: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshTokenRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
}

/// An empty token is accepted here and reported as invalid.
#[derive(Debug, Deserialize)]
pub struct ValidateTokenRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateTokenResponse {
    pub valid: bool,
}
