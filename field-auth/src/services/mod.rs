//! Services layer for field-auth.
//!
//! Verification codes, session tokens and the orchestration that ties them
//! to the user directory and the notifier.

pub mod auth;
pub mod clock;
pub mod code_storage;
pub mod directory;
pub mod error;
pub mod jwt;
pub mod metrics;
pub mod notifier;
pub mod sweeper;
pub mod verification;

pub use auth::{AuthService, CodeRequested};
pub use clock::{Clock, MockClock, SystemClock};
pub use code_storage::{CodeStorage, MemoryCodeStorage};
pub use directory::{InMemoryUserDirectory, UserDirectory};
pub use error::{AuthError, DirectoryError, NotifierError, StorageError};
pub use jwt::{IssuedToken, JwtService, SessionClaims};
pub use notifier::{LoggingNotifier, MockNotifier, Notifier, SmsGatewayNotifier};
pub use sweeper::CodeSweeper;
pub use verification::VerificationCodeStore;
