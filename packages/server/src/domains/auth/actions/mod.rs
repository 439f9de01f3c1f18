//! Auth domain actions - business logic functions
//!
//! Actions are async functions called directly from the HTTP routes.

mod login;
mod logout;

pub use login::{login, LoginResult};
pub use logout::logout;
