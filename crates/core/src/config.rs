//! Provisioning Configuration
//!
//! Settings for one provisioning run:
//! - Requested toolchain versions and cache key override
//! - Cache toggle and storage location
//! - SDK home and run state paths
//!
//! Values come from an optional TOML file and are overridden by CLI/CI inputs.

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProvisionError, Result};
use crate::state::RunState;
use crate::toolchain::ToolchainSpec;

/// Environment variable that overrides the cache store directory
pub const CACHE_DIR_ENV: &str = "SDK_PROVISION_CACHE_DIR";

/// Requested toolchain components
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolchainConfig {
    pub sdk_version: Option<String>,
    pub build_tools_version: Option<String>,
    pub ndk_version: Option<String>,
    pub cmake_version: Option<String>,
    /// Overrides the derived cache key
    pub cache_key: Option<String>,
}

/// Cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Restore before and save after installing
    pub enabled: bool,
    /// Cache store directory
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

/// Filesystem locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// SDK home (the cached directory)
    pub sdk_home: Option<PathBuf>,
    /// Run state file
    pub state_file: Option<PathBuf>,
}

/// Main provisioning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Configuration version for migrations
    pub version: u32,
    pub toolchain: ToolchainConfig,
    pub cache: CacheConfig,
    pub paths: PathsConfig,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            version: 1,
            toolchain: ToolchainConfig::default(),
            cache: CacheConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl ProvisionConfig {
    /// Load configuration from a TOML file
    pub async fn load(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let contents = tokio::fs::read_to_string(path).await?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load from `path` if given, otherwise start from defaults
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path).await,
            None => Ok(Self::default()),
        }
    }

    /// Overlay values from `inputs` onto the file configuration.
    ///
    /// Version inputs are trimmed; the cache key is taken as given.
    pub fn merge_inputs(&mut self, inputs: ToolchainConfig, use_cache: Option<bool>) {
        fn overlay(target: &mut Option<String>, value: Option<String>) {
            if let Some(value) = value {
                *target = Some(value);
            }
        }

        let trimmed = |value: Option<String>| value.map(|v| v.trim().to_string());

        overlay(&mut self.toolchain.sdk_version, trimmed(inputs.sdk_version));
        overlay(&mut self.toolchain.build_tools_version, trimmed(inputs.build_tools_version));
        overlay(&mut self.toolchain.ndk_version, trimmed(inputs.ndk_version));
        overlay(&mut self.toolchain.cmake_version, trimmed(inputs.cmake_version));
        overlay(&mut self.toolchain.cache_key, inputs.cache_key);

        if let Some(enabled) = use_cache {
            self.cache.enabled = enabled;
        }
    }

    /// Build the toolchain request; SDK and build-tools versions are required
    pub fn toolchain_spec(&self) -> Result<ToolchainSpec> {
        let required = |value: &Option<String>, name: &str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| ProvisionError::Config(format!("{} is required", name)))
        };

        Ok(ToolchainSpec {
            sdk_version: required(&self.toolchain.sdk_version, "sdk-version")?,
            build_tools_version: required(&self.toolchain.build_tools_version, "build-tools-version")?,
            ndk_version: self.toolchain.ndk_version.clone(),
            cmake_version: self.toolchain.cmake_version.clone(),
            explicit_key: self.toolchain.cache_key.clone(),
        })
    }

    /// SDK home: configured path, else `$HOME/android-sdk`
    pub fn sdk_home(&self) -> Result<PathBuf> {
        if let Some(path) = &self.paths.sdk_home {
            return Ok(path.clone());
        }

        dirs::home_dir()
            .map(|home| home.join("android-sdk"))
            .ok_or_else(|| ProvisionError::Config("Cannot determine home directory".into()))
    }

    /// Cache store directory: configured path, `$SDK_PROVISION_CACHE_DIR`,
    /// else the user cache directory
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(path) = &self.cache.dir {
            return Ok(path.clone());
        }

        if let Ok(path) = std::env::var(CACHE_DIR_ENV) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }

        dirs::cache_dir()
            .map(|dir| dir.join("sdk-provision"))
            .ok_or_else(|| ProvisionError::Config("Cannot determine cache directory".into()))
    }

    /// Run state file location
    pub fn state_file(&self) -> PathBuf {
        self.paths
            .state_file
            .clone()
            .unwrap_or_else(RunState::default_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProvisionConfig::default();
        assert_eq!(config.version, 1);
        assert!(config.cache.enabled);
        assert!(config.toolchain_spec().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let config = ProvisionConfig::from_toml(
            r#"
            [toolchain]
            sdk_version = "34"
            build_tools_version = "34.0.0"
            ndk_version = "26.1.10909125"

            [cache]
            enabled = false
            dir = "/tmp/cache"

            [paths]
            sdk_home = "/opt/android"
            "#,
        )
        .unwrap();

        assert!(!config.cache.enabled);
        assert_eq!(config.cache_dir().unwrap(), PathBuf::from("/tmp/cache"));
        assert_eq!(config.sdk_home().unwrap(), PathBuf::from("/opt/android"));

        let spec = config.toolchain_spec().unwrap();
        assert_eq!(spec.sdk_version, "34");
        assert_eq!(spec.ndk(), Some("26.1.10909125"));
        assert_eq!(spec.cmake(), None);
    }

    #[test]
    fn test_inputs_override_file() {
        let mut config = ProvisionConfig::from_toml(
            r#"
            [toolchain]
            sdk_version = "33"
            build_tools_version = "33.0.0"
            "#,
        )
        .unwrap();

        config.merge_inputs(
            ToolchainConfig {
                sdk_version: Some("34".into()),
                cache_key: Some("fixed".into()),
                ..Default::default()
            },
            Some(false),
        );

        let spec = config.toolchain_spec().unwrap();
        assert_eq!(spec.sdk_version, "34");
        assert_eq!(spec.build_tools_version, "33.0.0");
        assert_eq!(spec.explicit_key(), Some("fixed"));
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_inputs_trim_versions_but_not_key() {
        let mut config = ProvisionConfig::default();
        config.merge_inputs(
            ToolchainConfig {
                sdk_version: Some(" 33 ".into()),
                build_tools_version: Some("33.0.0\n".into()),
                ndk_version: Some("  ".into()),
                cache_key: Some(" my-fixed-key ".into()),
                ..Default::default()
            },
            None,
        );

        let spec = config.toolchain_spec().unwrap();
        assert_eq!(spec.sdk_version, "33");
        assert_eq!(spec.build_tools_version, "33.0.0");
        assert_eq!(spec.ndk(), None);
        assert_eq!(spec.explicit_key(), Some(" my-fixed-key "));
    }

    #[test]
    fn test_blank_required_version_rejected() {
        let mut config = ProvisionConfig::default();
        config.merge_inputs(
            ToolchainConfig {
                sdk_version: Some("33".into()),
                build_tools_version: Some(" ".into()),
                ..Default::default()
            },
            None,
        );

        let err = config.toolchain_spec().unwrap_err();
        assert!(err.to_string().contains("build-tools-version"));
    }
}
