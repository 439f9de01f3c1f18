//! Typed ID definitions for the entities this service touches.
//!
//! ```rust
//! use graphgate_core::common::{ClientId, PrincipalId};
//!
//! let principal = PrincipalId::new(7);
//! let client = ClientId::new(1);
//!
//! // This would be a compile error:
//! // let wrong: ClientId = principal;
//! # let _ = (principal, client);
//! ```

pub use super::id::Id;

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for authenticated users (rows of `users`).
pub struct User;

/// Marker type for rows of `clients`.
pub struct Client;

/// Marker type for rows of `roles`.
pub struct Role;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

/// Id of the authenticated caller. Principals are users.
pub type PrincipalId = Id<User>;

/// Typed ID for Client entities.
pub type ClientId = Id<Client>;

pub type RoleId = Id<Role>;
