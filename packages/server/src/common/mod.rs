// Common types shared across the application

pub mod auth;
pub mod entity_ids;
pub mod id;

pub use auth::{AuthError, FieldPermissionMap, Operation, Principal};
pub use entity_ids::*;
pub use id::Id;
