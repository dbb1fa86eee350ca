#[cfg(not(any(feature = "inmem-store", feature = "postgres-store")))]
compile_error!("enable a storage backend: `inmem-store` or `postgres-store`");

pub mod auth;
pub mod config;
pub mod document;
pub mod error;
pub mod models;
pub mod notify;
pub mod openapi;
pub mod rate_limit;
pub mod repo;
pub mod response;
pub mod routes;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
