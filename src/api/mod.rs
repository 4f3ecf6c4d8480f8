//! HTTP API
//!
//! JSON endpoints for client joins, result submissions and health checks.

pub mod handlers;
pub mod request;
pub mod server;

pub use handlers::ApiError;
pub use server::{build_router, serve, AppState};
