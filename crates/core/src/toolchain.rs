//! Requested toolchain components

use serde::{Deserialize, Serialize};

/// The set of component versions one pipeline run asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainSpec {
    /// Platform API level, e.g. `33`
    pub sdk_version: String,
    /// Build-tools version, e.g. `33.0.0`
    pub build_tools_version: String,
    /// NDK version, absent when no NDK is wanted
    #[serde(default)]
    pub ndk_version: Option<String>,
    /// CMake version, absent when no CMake is wanted
    #[serde(default)]
    pub cmake_version: Option<String>,
    /// Caller-supplied cache key that overrides derivation
    #[serde(default)]
    pub explicit_key: Option<String>,
}

impl ToolchainSpec {
    pub fn new(sdk_version: impl Into<String>, build_tools_version: impl Into<String>) -> Self {
        Self {
            sdk_version: sdk_version.into(),
            build_tools_version: build_tools_version.into(),
            ..Default::default()
        }
    }

    pub fn with_ndk(mut self, version: impl Into<String>) -> Self {
        self.ndk_version = Some(version.into());
        self
    }

    pub fn with_cmake(mut self, version: impl Into<String>) -> Self {
        self.cmake_version = Some(version.into());
        self
    }

    pub fn with_explicit_key(mut self, key: impl Into<String>) -> Self {
        self.explicit_key = Some(key.into());
        self
    }

    /// NDK version, treating an empty string as absent
    pub fn ndk(&self) -> Option<&str> {
        non_empty(self.ndk_version.as_deref())
    }

    /// CMake version, treating an empty string as absent
    pub fn cmake(&self) -> Option<&str> {
        non_empty(self.cmake_version.as_deref())
    }

    /// Explicit cache key, treating an empty string as absent
    pub fn explicit_key(&self) -> Option<&str> {
        non_empty(self.explicit_key.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
