//! Authentication and authorization primitives.
//!
//! Callers are identified by a [`Principal`]; tables are guarded per
//! [`Operation`]; field visibility is described by a [`FieldPermissionMap`].
//! Every failure is an [`AuthError`].

mod errors;
mod operation;
mod principal;

pub use errors::AuthError;
pub use operation::{Operation, UnknownOperation};
pub use principal::{FieldPermissionMap, Principal};
