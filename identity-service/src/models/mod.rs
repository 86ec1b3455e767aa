pub mod identity;
pub mod organization;
pub mod stored_token;

pub use identity::{Identity, LockState, LockoutPolicy};
pub use organization::{Organization, OrganizationMember};
pub use stored_token::{Provider, StoredToken, TokenKind, UnknownProvider, UnknownTokenKind};
