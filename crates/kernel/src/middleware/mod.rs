//! HTTP middleware.

pub mod apm;
pub mod auth;

pub use auth::CurrentUser;
