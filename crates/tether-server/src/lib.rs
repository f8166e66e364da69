//! HTTP API for Tether's calendar sync and availability.

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::app_router;
pub use state::{AppState, GoogleProviderSource};
