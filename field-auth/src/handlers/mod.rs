//! HTTP handlers for field-auth.

pub mod auth;
pub mod metrics;

pub use auth::*;
