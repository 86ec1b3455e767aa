pub mod password;
pub mod validation;

pub use password::{Password, PasswordHasher};
pub use validation::ValidatedJson;
