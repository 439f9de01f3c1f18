pub mod user;

pub use user::{NewUser, RoleAssignment, TableGrants, User};
