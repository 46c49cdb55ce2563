pub mod auth;
pub mod rate_limit;
pub mod security_headers;

pub use auth::{AuthMiddleware, Claims};
pub use rate_limit::RateLimit;
pub use security_headers::SecurityHeaders;
