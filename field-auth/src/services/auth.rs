use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::{
    clock::Clock,
    directory::UserDirectory,
    error::AuthError,
    jwt::{IssuedToken, JwtService},
    metrics,
    notifier::Notifier,
    verification::VerificationCodeStore,
};
use crate::utils::{mask_phone_number, normalize_phone_number, validate_code_format};

/// Result of a successful code request.
#[derive(Debug, Clone)]
pub struct CodeRequested {
    pub verification_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Drives the phone verification and session lifecycle. Holds no state of
/// its own beyond its collaborators.
#[derive(Clone)]
pub struct AuthService {
    codes: VerificationCodeStore,
    jwt: JwtService,
    directory: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl AuthService {
    pub fn new(
        codes: VerificationCodeStore,
        jwt: JwtService,
        directory: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            codes,
            jwt,
            directory,
            notifier,
            clock,
        }
    }

    pub fn codes(&self) -> &VerificationCodeStore {
        &self.codes
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    /// Generates, stores and delivers a code.
    ///
    /// When delivery fails the caller gets a retryable error carrying the
    /// verification id; the stored code stays valid until its TTL runs out and
    /// can be delivered again with [`Self::resend_verification_code`].
    #[tracing::instrument(skip_all)]
    pub async fn request_verification_code(&self, phone_number: &str) -> Result<CodeRequested, AuthError> {
        let phone_number = normalize_phone_number(phone_number).map_err(AuthError::Validation)?;

        let code = self.codes.generate_code();
        let verification_id = self.codes.store_code(&phone_number, &code).await?;
        let expires_at = self
            .codes
            .get_expiration(&verification_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Verification record vanished right after insert"))?;

        if let Err(e) = self
            .notifier
            .send_code(&phone_number, &code, self.codes.code_ttl())
            .await
        {
            metrics::record_code_issued("delivery_failed");
            tracing::warn!(
                verification_id = %verification_id,
                to = %mask_phone_number(&phone_number),
                error = %e,
                "Verification code delivery failed"
            );
            return Err(AuthError::from(e).with_verification_id(verification_id));
        }

        metrics::record_code_issued("sent");
        tracing::info!(
            verification_id = %verification_id,
            to = %mask_phone_number(&phone_number),
            expires_at = %expires_at,
            "Verification code issued"
        );

        Ok(CodeRequested {
            verification_id,
            expires_at,
        })
    }

    /// Delivers an already stored, unexpired code again. The record keeps its
    /// id, code and expiry.
    #[tracing::instrument(skip_all, fields(verification_id = %verification_id))]
    pub async fn resend_verification_code(
        &self,
        verification_id: &str,
        phone_number: &str,
    ) -> Result<CodeRequested, AuthError> {
        if verification_id.trim().is_empty() {
            return Err(AuthError::Validation("Verification id is required".to_string()));
        }
        let phone_number = normalize_phone_number(phone_number).map_err(AuthError::Validation)?;

        let record = self
            .codes
            .find_live(verification_id)
            .await?
            .filter(|record| record.phone_number == phone_number)
            .ok_or_else(|| {
                AuthError::Unauthorized("Invalid or expired verification id".to_string())
            })?;

        let expires_in = record.expires_at - self.clock.now();
        if let Err(e) = self
            .notifier
            .send_code(&record.phone_number, &record.code, expires_in)
            .await
        {
            metrics::record_code_issued("delivery_failed");
            tracing::warn!(
                to = %mask_phone_number(&record.phone_number),
                error = %e,
                "Verification code redelivery failed"
            );
            return Err(AuthError::from(e).with_verification_id(record.verification_id));
        }

        metrics::record_code_issued("resent");
        tracing::info!(
            to = %mask_phone_number(&record.phone_number),
            expires_at = %record.expires_at,
            "Verification code resent"
        );

        Ok(CodeRequested {
            verification_id: record.verification_id,
            expires_at: record.expires_at,
        })
    }

    /// Checks a code and, on success, signs in (creating the identity on first use).
    #[tracing::instrument(skip_all, fields(verification_id = %verification_id))]
    pub async fn verify_code(
        &self,
        verification_id: &str,
        phone_number: &str,
        code: &str,
    ) -> Result<IssuedToken, AuthError> {
        if verification_id.trim().is_empty() {
            return Err(AuthError::Validation("Verification id is required".to_string()));
        }
        let phone_number = normalize_phone_number(phone_number).map_err(AuthError::Validation)?;
        validate_code_format(code, self.codes.code_length()).map_err(AuthError::Validation)?;

        if !self
            .codes
            .validate_code_for_phone(verification_id, &phone_number, code)
            .await?
        {
            metrics::record_verification("rejected");
            tracing::info!("Verification code rejected");
            return Err(AuthError::Unauthorized(
                "Invalid or expired verification code".to_string(),
            ));
        }
        metrics::record_verification("accepted");

        let now = self.clock.now();
        let identity = self.directory.get_or_create(&phone_number, now).await?;
        if !identity.is_active {
            tracing::warn!(user_id = %identity.id, "Inactive identity attempted sign-in");
            return Err(AuthError::Unauthorized("User is inactive".to_string()));
        }
        let identity = self.directory.record_authentication(&identity.id, now).await?;

        let issued = self.jwt.issue(&identity.id, &identity.phone_number)?;
        metrics::record_token_issued("verify");
        tracing::info!(user_id = %identity.id, expires_at = %issued.expires_at, "Session token issued");
        Ok(issued)
    }

    /// Swaps any token this service signed, expired or not, for a fresh one,
    /// provided its subject is still active.
    #[tracing::instrument(skip_all)]
    pub async fn refresh_token(&self, token: &str) -> Result<IssuedToken, AuthError> {
        let claims = self
            .jwt
            .decode_claims(token, true)
            .ok_or_else(|| AuthError::Unauthorized("Invalid session token".to_string()))?;

        let identity = self
            .directory
            .find_by_id(&claims.sub)
            .await?
            .ok_or_else(|| AuthError::Unauthorized("Unknown user".to_string()))?;

        if !identity.is_active {
            tracing::warn!(user_id = %identity.id, "Refresh refused for inactive identity");
            return Err(AuthError::Unauthorized("User is inactive".to_string()));
        }

        let identity = self
            .directory
            .record_authentication(&identity.id, self.clock.now())
            .await?;

        let issued = self.jwt.issue(&identity.id, &identity.phone_number)?;
        metrics::record_token_issued("refresh");
        tracing::info!(user_id = %identity.id, expires_at = %issued.expires_at, "Session token refreshed");
        Ok(issued)
    }

    pub fn validate_token(&self, token: &str) -> bool {
        self.jwt.validate(token)
    }

    pub async fn health_check(&self) -> Result<(), AuthError> {
        self.directory.health_check().await?;
        self.notifier.health_check().await?;
        Ok(())
    }
}
