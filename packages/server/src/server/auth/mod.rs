// Session tokens and the Operation Guard
pub mod guard;
pub mod session;

pub use guard::*;
pub use session::*;
