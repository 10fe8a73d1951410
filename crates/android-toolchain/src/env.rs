//! Environment Manager
//!
//! Computes the environment a provisioned SDK home needs (`ANDROID_HOME`,
//! NDK location, PATH entries) and hands it to the CI runner.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use sdk_provision_core::ToolchainSpec;
use tracing::{debug, info};

/// Environment configuration
#[derive(Debug, Clone, Default)]
pub struct EnvironmentConfig {
    /// ANDROID_HOME / ANDROID_SDK_ROOT
    pub android_home: Option<PathBuf>,
    /// ANDROID_NDK_HOME
    pub ndk_home: Option<PathBuf>,
    /// Additional PATH entries
    pub path_additions: Vec<PathBuf>,
}

impl EnvironmentConfig {
    /// Layout of an SDK home provisioned for `spec`
    pub fn for_toolchain(sdk_home: &Path, spec: &ToolchainSpec) -> Self {
        let mut config = Self {
            android_home: Some(sdk_home.to_path_buf()),
            ..Default::default()
        };

        config.path_additions.push(sdk_home.join("cmdline-tools").join("latest").join("bin"));
        config.path_additions.push(sdk_home.join("platform-tools"));
        config
            .path_additions
            .push(sdk_home.join("build-tools").join(&spec.build_tools_version));

        if let Some(ndk) = spec.ndk() {
            config.ndk_home = Some(sdk_home.join("ndk").join(ndk));
        }

        if let Some(cmake) = spec.cmake() {
            config.path_additions.push(sdk_home.join("cmake").join(cmake).join("bin"));
        }

        config
    }
}

/// Environment Manager
pub struct EnvManager {
    config: EnvironmentConfig,
}

impl EnvManager {
    /// Create a new environment manager
    pub fn new(config: EnvironmentConfig) -> Self {
        Self { config }
    }

    /// Get environment variables to set
    pub fn get_env_vars(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();

        // Android SDK
        if let Some(ref path) = self.config.android_home {
            let path_str = path.to_string_lossy().to_string();
            vars.insert("ANDROID_HOME".to_string(), path_str.clone());
            vars.insert("ANDROID_SDK_ROOT".to_string(), path_str);
        }

        // Android NDK
        if let Some(ref path) = self.config.ndk_home {
            let path_str = path.to_string_lossy().to_string();
            vars.insert("ANDROID_NDK_HOME".to_string(), path_str.clone());
            vars.insert("ANDROID_NDK_ROOT".to_string(), path_str);
        }

        vars
    }

    /// PATH entries to prepend
    pub fn path_additions(&self) -> &[PathBuf] {
        &self.config.path_additions
    }

    /// Get PATH value with the additions prepended to `original_path`
    pub fn get_path(&self, original_path: &str) -> String {
        let path_sep = if cfg!(windows) { ";" } else { ":" };

        if self.config.path_additions.is_empty() {
            return original_path.to_string();
        }

        let additions: Vec<String> = self
            .config
            .path_additions
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect();

        if original_path.is_empty() {
            return additions.join(path_sep);
        }

        format!("{}{}{}", additions.join(path_sep), path_sep, original_path)
    }

    /// Get shell export commands (for terminal display)
    pub fn shell_exports(&self) -> String {
        let mut exports = String::new();

        for (key, value) in self.get_env_vars() {
            if cfg!(windows) {
                exports.push_str(&format!("set {}={}\n", key, value));
            } else {
                exports.push_str(&format!("export {}=\"{}\"\n", key, value));
            }
        }

        if !self.config.path_additions.is_empty() {
            if cfg!(windows) {
                exports.push_str(&format!("set PATH={}\n", self.get_path("%PATH%")));
            } else {
                exports.push_str(&format!("export PATH=\"{}\"\n", self.get_path("$PATH")));
            }
        }

        exports
    }
}

/// Files the CI runner reads environment, PATH and step outputs from
#[derive(Debug, Clone, Default)]
pub struct CiExporter {
    pub env_file: Option<PathBuf>,
    pub path_file: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
}

impl CiExporter {
    /// Read `GITHUB_ENV`, `GITHUB_PATH` and `GITHUB_OUTPUT`
    pub fn from_env() -> Self {
        let file = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        };

        Self {
            env_file: file("GITHUB_ENV"),
            path_file: file("GITHUB_PATH"),
            output_file: file("GITHUB_OUTPUT"),
        }
    }

    /// Export variables and PATH entries. Without runner files the exports
    /// are printed as shell commands instead.
    pub fn export(&self, env: &EnvManager) -> std::io::Result<()> {
        match (&self.env_file, &self.path_file) {
            (Some(env_file), Some(path_file)) => {
                let mut vars = String::new();
                for (key, value) in env.get_env_vars() {
                    vars.push_str(&format!("{}={}\n", key, value));
                }
                append(env_file, &vars)?;

                // the runner prepends each line, so the last line wins
                let mut paths = String::new();
                for path in env.path_additions().iter().rev() {
                    paths.push_str(&format!("{}\n", path.to_string_lossy()));
                }
                append(path_file, &paths)?;

                info!("Exported Android SDK environment to the runner");
            }
            _ => {
                print!("{}", env.shell_exports());
                debug!("No runner environment files, printed shell exports");
            }
        }

        Ok(())
    }

    /// Set a step output
    pub fn set_output(&self, name: &str, value: &str) -> std::io::Result<()> {
        match &self.output_file {
            Some(path) => append(path, &format!("{}={}\n", name, value)),
            None => {
                println!("{}={}", name, value);
                Ok(())
            }
        }
    }
}

fn append(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(contents.as_bytes())
}
