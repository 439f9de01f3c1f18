// GraphQL request pipeline: parsing, field filtering, resolver dispatch
pub mod executor;
pub mod filter;
pub mod registry;
pub mod selection;

pub use executor::*;
pub use filter::{FieldScope, SelectionFilter};
pub use registry::*;
pub use selection::*;
