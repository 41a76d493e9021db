pub mod auth;
pub mod request_log;

pub use auth::{jwt_auth_middleware, AuthUser};
pub use request_log::{request_log_middleware, RequestLifecycle};
