//! sdk-provision - Android SDK provisioning for CI runners
//!
//! Installs an Android SDK home (platform, build-tools, platform-tools and
//! optionally NDK and CMake) and caches it under a key derived from the
//! requested versions, so later runs restore it instead of reinstalling.
//!
//! ## Architecture
//!
//! - `sdk-provision-core`: configuration, run state and error types
//! - `sdk-provision-android-toolchain`: cache keys, cache store, downloads,
//!   `sdkmanager` invocation and environment export

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commands;

// Re-export main components for library usage
pub use sdk_provision_android_toolchain as toolchain;
pub use sdk_provision_core as core;

/// Prelude module for convenient imports
pub mod prelude {
    pub use sdk_provision_android_toolchain::{
        CacheGateway, CacheKey, CacheStore, LocalCacheStore, Provisioner, SdkManager,
    };
    pub use sdk_provision_core::{ProvisionConfig, RunState, ToolchainSpec};
}
