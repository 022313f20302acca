mod identity;
mod verification;

pub use identity::Identity;
pub use verification::VerificationRecord;
