//! Android Toolchain Provisioning
//!
//! Handles the provisioning of an Android SDK home on a CI runner:
//! - Cache keys derived from the requested component versions
//! - Cache restore/save of the SDK home
//! - Download of the SDK command-line tools
//! - Installation of platforms, build tools, NDK and CMake through `sdkmanager`
//! - Export of the resulting environment

pub mod cache;
pub mod cache_key;
pub mod downloader;
pub mod env;
pub mod provisioner;
pub mod sdk_manager;

pub use cache::{CacheEntry, CacheError, CacheGateway, CacheStore, LocalCacheStore, RESTORED_ENTRY_STATE};
pub use cache_key::{CacheKey, CACHE_SCHEMA_TAG};
pub use downloader::{CmdlineToolsInfo, DownloadConfig, DownloadError, Platform, ToolchainDownloader};
pub use env::{CiExporter, EnvManager, EnvironmentConfig};
pub use provisioner::{ProvisionOutcome, Provisioner};
pub use sdk_manager::{ComponentFailure, SdkComponent, SdkManager, SdkManagerError};
