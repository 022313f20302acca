use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::clock::Clock;
use super::error::AuthError;
use crate::config::SessionConfig;

/// Role carried by every session token this service issues.
pub const FIELD_PERSONNEL_ROLE: &str = "field-personnel";

/// Claims for session tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Phone number the identity verified with
    pub phone: String,
    pub role: String,
    pub iss: String,
    pub aud: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Token ID, unique per issue
    pub jti: String,
}

/// A freshly signed session token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// HS256 session token service. Keys and settings are fixed at construction.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    session_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl JwtService {
    /// Fails when the signing key, issuer or audience is missing, or the
    /// lifetime is out of range.
    pub fn new(config: &SessionConfig, clock: Arc<dyn Clock>) -> Result<Self, AuthError> {
        config
            .validate()
            .map_err(|e| AuthError::Configuration(e.to_string()))?;

        let secret = config.signing_key.expose_secret().as_bytes();

        // Expiry is checked against the injected clock, not the system time.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&[&config.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        tracing::info!(
            issuer = %config.issuer,
            audience = %config.audience,
            ttl_minutes = config.ttl_minutes,
            "JWT service initialized with HS256 key"
        );

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            session_ttl: Duration::minutes(config.ttl_minutes),
            clock,
        })
    }

    /// Override the session lifetime (sub-minute lifetimes are useful in tests).
    pub fn with_session_ttl(mut self, session_ttl: Duration) -> Self {
        self.session_ttl = session_ttl;
        self
    }

    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl.num_seconds()
    }

    /// Issue a session token for an identity.
    pub fn issue(&self, user_id: &str, phone_number: &str) -> Result<IssuedToken, AuthError> {
        let now = self.clock.now();
        let exp = now
            .checked_add_signed(self.session_ttl)
            .ok_or_else(|| AuthError::Internal(anyhow::anyhow!("Token expiry out of range")))?
            .timestamp();
        let expires_at = DateTime::<Utc>::from_timestamp(exp, 0)
            .ok_or_else(|| AuthError::Internal(anyhow::anyhow!("Token expiry out of range")))?;

        let claims = SessionClaims {
            sub: user_id.to_string(),
            phone: phone_number.to_string(),
            role: FIELD_PERSONNEL_ROLE.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp,
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Failed to encode session token: {}", e)))?;

        Ok(IssuedToken { token, expires_at })
    }

    /// True when signature, issuer, audience and expiry all check out.
    pub fn validate(&self, token: &str) -> bool {
        self.decode_claims(token, false).is_some()
    }

    /// Decode and verify a token. `ignore_expiry` skips only the expiry test.
    ///
    /// Any failure yields `None`; malformed input is never an error.
    pub fn decode_claims(&self, token: &str, ignore_expiry: bool) -> Option<SessionClaims> {
        if token.is_empty() {
            return None;
        }

        let claims = match decode::<SessionClaims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::debug!(error = %e, "Session token rejected");
                return None;
            }
        };

        if !ignore_expiry && self.clock.now().timestamp() >= claims.exp {
            tracing::debug!(sub = %claims.sub, "Session token expired");
            return None;
        }

        Some(claims)
    }

    pub fn extract_user_id(&self, token: &str) -> Option<String> {
        self.decode_claims(token, false).map(|claims| claims.sub)
    }
}
