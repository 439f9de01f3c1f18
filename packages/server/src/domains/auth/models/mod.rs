pub mod grant;
pub mod user;

pub use grant::{FieldPermission, Grant};
pub use user::UserCredentials;
