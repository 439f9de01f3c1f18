//! Auth domain - password login and session tokens
//!
//! Responsibilities:
//! - Credential lookup and bcrypt verification
//! - Issuing and revoking opaque session tokens
//! - Role grants and field permissions (models only; enforced in server::auth)

pub mod actions;
pub mod models;

pub use actions::{login, logout, LoginResult};
