//! encore-api: HTTP API for the encore site backend
//!
//! Public read-only routes for the site plus admin CRUD, ordered joins and
//! sync control under `/api/admin`. Built with axum.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use error::{ApiError, Result};
pub use server::{AppState, build_router, start_server};
