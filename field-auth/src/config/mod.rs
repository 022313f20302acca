use secrecy::{ExposeSecret, SecretString};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::fmt;

/// Smallest accepted HMAC signing key, in bytes.
pub const MIN_SIGNING_KEY_BYTES: usize = 32;

/// Longest accepted session lifetime: one year.
pub const MAX_SESSION_TTL_MINUTES: i64 = 365 * 24 * 60;

/// Longest accepted verification code lifetime: one day.
pub const MAX_CODE_TTL_MINUTES: i64 = 24 * 60;

pub const MIN_CODE_LENGTH: usize = 4;
pub const MAX_CODE_LENGTH: usize = 12;

pub struct AuthConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub session: SessionConfig,
    pub verification: VerificationConfig,
    pub sms: Option<SmsGatewayConfig>,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

/// Session token settings. Fixed for the lifetime of the process.
pub struct SessionConfig {
    pub signing_key: SecretString,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct VerificationConfig {
    pub code_length: usize,
    pub code_ttl_minutes: i64,
    pub sweep_interval_seconds: u64,
}

pub struct SmsGatewayConfig {
    pub url: String,
    pub auth_key: SecretString,
    pub sender_id: String,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub code_request_attempts: u32,
    pub code_request_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            code_ttl_minutes: 10,
            sweep_interval_seconds: 60,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            code_request_attempts: 5,
            code_request_window_seconds: 900,
            global_ip_limit: 100,
            global_ip_window_seconds: 60,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("signing_key", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl_minutes", &self.ttl_minutes)
            .finish()
    }
}

impl fmt::Debug for SmsGatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmsGatewayConfig")
            .field("url", &self.url)
            .field("auth_key", &"[REDACTED]")
            .field("sender_id", &self.sender_id)
            .finish()
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("common", &self.common)
            .field("environment", &self.environment)
            .field("service_name", &self.service_name)
            .field("service_version", &self.service_version)
            .field("log_level", &self.log_level)
            .field("otlp_endpoint", &self.otlp_endpoint)
            .field("session", &self.session)
            .field("verification", &self.verification)
            .field("sms", &self.sms)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

impl AuthConfig {
    /// Loads configuration from the process environment. Fails fast on any
    /// missing or invalid setting so the service never starts half-configured.
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        Self::from_lookup(common_config, |key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_str = lookup("ENVIRONMENT").unwrap_or_else(|| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;
        let get = |key: &str, default: Option<&str>| get_env(&lookup, key, default, is_prod);

        let sms = match lookup("SMS_GATEWAY_URL").filter(|v| !v.trim().is_empty()) {
            Some(url) => Some(SmsGatewayConfig {
                url,
                auth_key: SecretString::new(required(&lookup, "SMS_GATEWAY_AUTH_KEY")?),
                sender_id: get("SMS_SENDER_ID", Some("FIELDAUTH"))?,
            }),
            None => None,
        };

        let config = AuthConfig {
            common,
            environment: environment.clone(),
            service_name: get("SERVICE_NAME", Some("field-auth"))?,
            service_version: get("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")))?,
            log_level: get("LOG_LEVEL", Some("info"))?,
            otlp_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|v| !v.trim().is_empty()),
            session: SessionConfig {
                signing_key: SecretString::new(required(&lookup, "SESSION_SIGNING_KEY")?),
                issuer: required(&lookup, "SESSION_ISSUER")?,
                audience: required(&lookup, "SESSION_AUDIENCE")?,
                ttl_minutes: parse(get("SESSION_TTL_MINUTES", Some("480"))?, "SESSION_TTL_MINUTES")?,
            },
            verification: VerificationConfig {
                code_length: parse(
                    get("VERIFICATION_CODE_LENGTH", Some("6"))?,
                    "VERIFICATION_CODE_LENGTH",
                )?,
                code_ttl_minutes: parse(
                    get("VERIFICATION_CODE_TTL_MINUTES", Some("10"))?,
                    "VERIFICATION_CODE_TTL_MINUTES",
                )?,
                sweep_interval_seconds: parse(
                    get("VERIFICATION_SWEEP_INTERVAL_SECONDS", Some("60"))?,
                    "VERIFICATION_SWEEP_INTERVAL_SECONDS",
                )?,
            },
            sms,
            rate_limit: RateLimitConfig {
                code_request_attempts: parse(
                    get("RATE_LIMIT_CODE_REQUESTS", Some("5"))?,
                    "RATE_LIMIT_CODE_REQUESTS",
                )?,
                code_request_window_seconds: parse(
                    get("RATE_LIMIT_CODE_WINDOW_SECONDS", Some("900"))?,
                    "RATE_LIMIT_CODE_WINDOW_SECONDS",
                )?,
                global_ip_limit: parse(
                    get("RATE_LIMIT_GLOBAL_IP_LIMIT", Some("100"))?,
                    "RATE_LIMIT_GLOBAL_IP_LIMIT",
                )?,
                global_ip_window_seconds: parse(
                    get("RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS", Some("60"))?,
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(config_error("PORT must be greater than 0"));
        }

        self.session.validate()?;
        self.verification.validate()?;

        if self.environment == Environment::Prod && self.sms.is_none() {
            return Err(config_error(
                "SMS_GATEWAY_URL is required in production; codes cannot be delivered",
            ));
        }

        Ok(())
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        let key = self.signing_key.expose_secret();
        if key.trim().is_empty() {
            return Err(config_error("SESSION_SIGNING_KEY must not be empty"));
        }
        if key.len() < MIN_SIGNING_KEY_BYTES {
            return Err(config_error(format!(
                "SESSION_SIGNING_KEY must be at least {} bytes",
                MIN_SIGNING_KEY_BYTES
            )));
        }
        if self.issuer.trim().is_empty() {
            return Err(config_error("SESSION_ISSUER must not be empty"));
        }
        if self.audience.trim().is_empty() {
            return Err(config_error("SESSION_AUDIENCE must not be empty"));
        }
        if !(1..=MAX_SESSION_TTL_MINUTES).contains(&self.ttl_minutes) {
            return Err(config_error(format!(
                "SESSION_TTL_MINUTES must be between 1 and {}",
                MAX_SESSION_TTL_MINUTES
            )));
        }
        Ok(())
    }
}

impl VerificationConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(MIN_CODE_LENGTH..=MAX_CODE_LENGTH).contains(&self.code_length) {
            return Err(config_error(format!(
                "VERIFICATION_CODE_LENGTH must be between {} and {}",
                MIN_CODE_LENGTH, MAX_CODE_LENGTH
            )));
        }

        if !(1..=MAX_CODE_TTL_MINUTES).contains(&self.code_ttl_minutes) {
            return Err(config_error(format!(
                "VERIFICATION_CODE_TTL_MINUTES must be between 1 and {}",
                MAX_CODE_TTL_MINUTES
            )));
        }

        if self.sweep_interval_seconds == 0 {
            return Err(config_error(
                "VERIFICATION_SWEEP_INTERVAL_SECONDS must be positive",
            ));
        }
        Ok(())
    }
}

fn config_error(msg: impl fmt::Display) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(msg.to_string()))
}

fn get_env<F>(lookup: &F, key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(val) => Ok(val),
        None => {
            if is_prod {
                Err(config_error(format!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(config_error(format!("{} is required but not set", key)))
            }
        }
    }
}

/// Secrets and identity settings have no default in any environment.
fn required<F>(lookup: &F, key: &str) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| config_error(format!("{} is required but not set", key)))
}

fn parse<T>(value: String, key: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| config_error(format!("{} is invalid: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    fn base_vars() -> HashMap<&'static str, String> {
        HashMap::from([
            ("SESSION_SIGNING_KEY", KEY.to_string()),
            ("SESSION_ISSUER", "field-auth".to_string()),
            ("SESSION_AUDIENCE", "field-app".to_string()),
        ])
    }

    fn load(vars: &HashMap<&'static str, String>) -> Result<AuthConfig, AppError> {
        AuthConfig::from_lookup(core_config::Config::default(), |k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults_applied_in_dev() -> Result<(), AppError> {
        let config = load(&base_vars())?;

        assert_eq!(config.environment, Environment::Dev);
        assert_eq!(config.session.ttl_minutes, 480);
        assert_eq!(config.verification.code_length, 6);
        assert_eq!(config.verification.code_ttl_minutes, 10);
        assert!(config.sms.is_none());
        Ok(())
    }

    #[test]
    fn test_missing_signing_key_is_fatal() {
        let mut vars = base_vars();
        vars.remove("SESSION_SIGNING_KEY");

        let err = load(&vars).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
        assert!(err.to_string().contains("SESSION_SIGNING_KEY"));
    }

    #[test]
    fn test_missing_issuer_or_audience_is_fatal() {
        for key in ["SESSION_ISSUER", "SESSION_AUDIENCE"] {
            let mut vars = base_vars();
            vars.insert(key, "   ".to_string());
            let err = load(&vars).unwrap_err();
            assert!(err.to_string().contains(key));
        }
    }

    #[test]
    fn test_short_signing_key_rejected() {
        let mut vars = base_vars();
        vars.insert("SESSION_SIGNING_KEY", "too-short".to_string());
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_code_length_bounds() {
        let mut vars = base_vars();
        vars.insert("VERIFICATION_CODE_LENGTH", "3".to_string());
        assert!(load(&vars).is_err());

        vars.insert("VERIFICATION_CODE_LENGTH", "8".to_string());
        assert_eq!(load(&vars).unwrap().verification.code_length, 8);
    }

    #[test]
    fn test_ttls_out_of_range_rejected() {
        for (key, value) in [
            ("SESSION_TTL_MINUTES", "0"),
            ("SESSION_TTL_MINUTES", "-5"),
            ("SESSION_TTL_MINUTES", "1000000000000"),
            ("SESSION_TTL_MINUTES", "9223372036854775807"),
            ("VERIFICATION_CODE_TTL_MINUTES", "0"),
            ("VERIFICATION_CODE_TTL_MINUTES", "1441"),
            ("VERIFICATION_CODE_TTL_MINUTES", "1000000000000"),
        ] {
            let mut vars = base_vars();
            vars.insert(key, value.to_string());

            let err = load(&vars).unwrap_err();
            assert!(matches!(err, AppError::ConfigError(_)), "{key}={value}");
            assert!(err.to_string().contains(key), "{key}={value}: {err}");
        }
    }

    #[test]
    fn test_ttl_upper_bounds_accepted() -> Result<(), AppError> {
        let mut vars = base_vars();
        vars.insert("SESSION_TTL_MINUTES", MAX_SESSION_TTL_MINUTES.to_string());
        vars.insert("VERIFICATION_CODE_TTL_MINUTES", MAX_CODE_TTL_MINUTES.to_string());

        let config = load(&vars)?;
        assert_eq!(config.session.ttl_minutes, MAX_SESSION_TTL_MINUTES);
        assert_eq!(config.verification.code_ttl_minutes, MAX_CODE_TTL_MINUTES);
        Ok(())
    }

    #[test]
    fn test_prod_requires_sms_gateway() {
        let mut vars = base_vars();
        vars.insert("ENVIRONMENT", "prod".to_string());
        for (k, v) in [
            ("SERVICE_NAME", "field-auth"),
            ("SERVICE_VERSION", "1.0.0"),
            ("LOG_LEVEL", "info"),
            ("SESSION_TTL_MINUTES", "480"),
            ("VERIFICATION_CODE_LENGTH", "6"),
            ("VERIFICATION_CODE_TTL_MINUTES", "10"),
            ("VERIFICATION_SWEEP_INTERVAL_SECONDS", "60"),
            ("RATE_LIMIT_CODE_REQUESTS", "5"),
            ("RATE_LIMIT_CODE_WINDOW_SECONDS", "900"),
            ("RATE_LIMIT_GLOBAL_IP_LIMIT", "100"),
            ("RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS", "60"),
        ] {
            vars.insert(k, v.to_string());
        }
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("SMS_GATEWAY_URL"));

        vars.insert("SMS_GATEWAY_URL", "https://sms.example.com/send".to_string());
        vars.insert("SMS_GATEWAY_AUTH_KEY", "gateway-key".to_string());
        vars.insert("SMS_SENDER_ID", "FIELD".to_string());
        let config = load(&vars).unwrap();
        assert_eq!(config.sms.unwrap().sender_id, "FIELD");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = load(&base_vars()).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains(KEY));
        assert!(rendered.contains("[REDACTED]"));
    }
}
