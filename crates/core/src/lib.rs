//! sdk-provision core - configuration and shared types
//!
//! This crate holds what every provisioning step shares: the requested
//! toolchain, the layered configuration, the per-run state store and the
//! central error type.

pub mod config;
pub mod error;
pub mod state;
pub mod toolchain;

pub use config::{CacheConfig, PathsConfig, ProvisionConfig, ToolchainConfig};
pub use error::{ProvisionError, Result};
pub use state::RunState;
pub use toolchain::ToolchainSpec;

/// sdk-provision version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
