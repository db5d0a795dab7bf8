//! Fieldcheck gateway: dynamic collection CRUD, session auth, and blob
//! storage behind an axum HTTP service.

pub mod auth;
pub mod collections;
pub mod config;
pub mod error;
pub mod registry;
pub mod routes;
pub mod storage;

pub use config::GatewayConfig;
pub use error::AppError;
pub use routes::{app_router, AppState};
