// Business domains
pub mod auth;
pub mod clients;
pub mod users;
