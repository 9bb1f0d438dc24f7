pub mod phone_validation;
pub use phone_validation::validate_phone_number;
