//! # Actix Middleware Library
//!
//! Middleware shared by the chat service HTTP and WebSocket surfaces
//!
//! ## Modules
//! - `jwt_auth`: verifies the caller's JWT and injects `UserId`
//! - `request_id`: propagates or generates `x-request-id`
//! - `logging`: request/response logging through `tracing`

pub mod jwt_auth;
pub mod logging;
pub mod request_id;

pub use jwt_auth::{Claims, JwtAuth, UserId};
pub use logging::Logging;
pub use request_id::{RequestId, RequestIdValue};
