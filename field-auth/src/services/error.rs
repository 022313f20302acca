use service_core::error::AppError;
use thiserror::Error;

/// Default retry hint handed to callers when a dependency is down.
pub const DEFAULT_RETRY_AFTER_SECONDS: u64 = 30;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Malformed input, rejected before any side effect.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Wrong or expired code, bad token, or an unknown/inactive user.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The notifier or the user directory could not be reached.
    ///
    /// `verification_id` is set when a code was stored but not delivered; the
    /// caller can ask for it to be resent instead of requesting a new one.
    #[error("Dependency failure: {source}")]
    DependencyFailure {
        #[source]
        source: anyhow::Error,
        retry_after: Option<u64>,
        verification_id: Option<String>,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn dependency(source: impl Into<anyhow::Error>) -> Self {
        AuthError::DependencyFailure {
            source: source.into(),
            retry_after: Some(DEFAULT_RETRY_AFTER_SECONDS),
            verification_id: None,
        }
    }

    /// Attach the id of a stored but undelivered code to a dependency failure.
    pub fn with_verification_id(self, id: impl Into<String>) -> Self {
        match self {
            AuthError::DependencyFailure {
                source,
                retry_after,
                ..
            } => AuthError::DependencyFailure {
                source,
                retry_after,
                verification_id: Some(id.into()),
            },
            other => other,
        }
    }

    pub fn verification_id(&self) -> Option<&str> {
        match self {
            AuthError::DependencyFailure {
                verification_id, ..
            } => verification_id.as_deref(),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AuthError::DependencyFailure { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Only dependency failures are worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::DependencyFailure { .. })
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Verification id space exhausted after {0} attempts")]
    IdSpaceExhausted(usize),

    #[error("Verification code expiry is out of range")]
    ExpiryOutOfRange,

    #[error("Storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::IdSpaceExhausted(_) | StorageError::ExpiryOutOfRange => {
                AuthError::Internal(anyhow::Error::new(err))
            }
            StorageError::Backend(e) => AuthError::dependency(e),
        }
    }
}

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("User directory unavailable: {0}")]
    Unavailable(String),

    #[error("Identity not found: {0}")]
    NotFound(String),
}

impl From<DirectoryError> for AuthError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound(_) => AuthError::Unauthorized("Unknown user".to_string()),
            DirectoryError::Unavailable(_) => AuthError::dependency(err),
        }
    }
}

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send error: {0}")]
    SendFailed(String),
}

impl From<NotifierError> for AuthError {
    fn from(err: NotifierError) -> Self {
        AuthError::dependency(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            AuthError::Unauthorized(msg) => AppError::Unauthorized(anyhow::anyhow!(msg)),
            AuthError::DependencyFailure {
                source,
                retry_after,
                ..
            } => AppError::DependencyUnavailable(source, retry_after),
            AuthError::Configuration(msg) => AppError::ConfigError(anyhow::anyhow!(msg)),
            AuthError::Internal(e) => AppError::InternalError(e),
        }
    }
}
