pub mod auth;
pub mod json;
pub mod rate_limit;
pub mod response;
pub mod sanitize;
pub mod security_headers;

pub use auth::CurrentUser;
pub use json::ApiJson;
pub use response::{ApiResponse, ApiResult};
