pub mod phone;
pub mod validation;

pub use phone::{mask_phone_number, normalize_phone_number, validate_code_format};
pub use validation::ValidatedJson;
