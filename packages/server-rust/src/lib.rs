//! EMS Server: HTTP front end with per-request tenant resolution and
//! per-tenant connection routing.

pub mod app;
pub mod catalog;
pub mod config;
pub mod error;
pub mod network;
pub mod pool;
pub mod telemetry;
pub mod tenancy;
pub mod tokens;

pub use app::build_state;
pub use config::{ServerArgs, ServerConfig};
pub use error::ApiError;
pub use network::{AppState, NetworkModule};

#[cfg(test)]
pub(crate) mod test_support;
