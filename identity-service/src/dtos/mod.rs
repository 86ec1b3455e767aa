pub mod auth;
pub mod oauth;
