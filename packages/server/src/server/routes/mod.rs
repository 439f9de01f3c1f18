// HTTP routes
pub mod auth;
pub mod clients;
pub mod graphql;
pub mod health;
mod rest;
pub mod users;

pub use auth::*;
pub use clients::*;
pub use graphql::*;
pub use health::*;
pub use rest::RestError;
pub use users::*;
