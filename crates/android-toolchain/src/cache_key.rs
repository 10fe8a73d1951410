//! Cache Keys
//!
//! Derives the identity under which a provisioned SDK home is cached.

use std::fmt;

use serde::{Deserialize, Serialize};
use sdk_provision_core::ToolchainSpec;

/// Layout version of the cached SDK home. Bump it whenever the set or meaning
/// of the cached contents changes so older entries stop matching.
pub const CACHE_SCHEMA_TAG: &str = "v3.2";

/// Identity of one cached SDK home
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `spec`.
    ///
    /// A non-empty explicit key wins outright. Otherwise the key is
    /// `sdk-buildtools-ndk-cmake-tag`, where a missing NDK stays as an empty
    /// segment and a missing CMake drops its segment.
    pub fn derive(spec: &ToolchainSpec) -> Self {
        if let Some(explicit) = spec.explicit_key() {
            return Self(explicit.to_string());
        }

        let mut key = format!(
            "{}-{}-{}",
            spec.sdk_version,
            spec.build_tools_version,
            spec.ndk().unwrap_or_default()
        );
        if let Some(cmake) = spec.cmake() {
            key.push('-');
            key.push_str(cmake);
        }
        key.push('-');
        key.push_str(CACHE_SCHEMA_TAG);

        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
