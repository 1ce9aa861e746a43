pub mod error;
pub mod filter;
pub mod filter_order;
pub mod filter_where;
pub mod query_string;
pub mod types;

pub use filter::Filter;
pub use query_string::QueryString;
pub use types::*;
