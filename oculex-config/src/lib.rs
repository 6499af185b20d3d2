//! Shared configuration library for Oculex.
//!
//! This crate centralizes config loading and validation so the server and
//! any auxiliary binaries agree on defaults and environment keys. Loading
//! is environment-first with `.env` support; validation reports non-fatal
//! warnings alongside the composed [`Config`].

pub mod loader;
pub mod models;

pub use loader::{
    ConfigLoad, ConfigLoadError, ConfigLoader, ConfigWarning, ConfigWarnings,
};
pub use models::{
    Config, ConfigMetadata, CorsConfig, GatewayConfig, ServerConfig,
    StoreConfig,
};
