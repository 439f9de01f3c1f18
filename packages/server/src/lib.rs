// graphgate - API Core
//
// Request authorization in front of a GraphQL endpoint: a token store for
// sessions, role grants per (table, operation), and a selection filter that
// prunes nested fields the caller may not see before any resolver runs.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
