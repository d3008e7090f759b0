//! HTTP surface for the audit log viewing and export engine.
//!
//! Routes, handlers, and middleware are thin adapters over `audit-engine`;
//! identity arrives via gateway-injected headers and every engine error maps
//! to a stable API error shape.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiErrorResponse};
pub use middleware::auth_context::AuthContext;
pub use routes::create_app;
pub use server::{AppState, ServerConfig};
