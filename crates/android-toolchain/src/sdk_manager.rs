//! SDK Manager
//!
//! Wraps the Android SDK manager to install SDK components.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use futures::future::join_all;
use sdk_provision_core::{ProvisionError, ToolchainSpec};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// SDK component types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdkComponent {
    Platform(String),   // platforms;android-XX
    BuildTools(String), // build-tools;XX.X.X
    PlatformTools,      // platform-tools
    Ndk(String),        // ndk;XX.X.XXXXX
    Cmake(String),      // cmake;X.XX.X
}

impl SdkComponent {
    /// Get the SDK manager package name
    pub fn package_name(&self) -> String {
        match self {
            SdkComponent::Platform(api) => format!("platforms;android-{}", api),
            SdkComponent::BuildTools(version) => format!("build-tools;{}", version),
            SdkComponent::PlatformTools => "platform-tools".to_string(),
            SdkComponent::Ndk(version) => format!("ndk;{}", version),
            SdkComponent::Cmake(version) => format!("cmake;{}", version),
        }
    }

    /// Components needed for `spec`, one install command each
    pub fn for_toolchain(spec: &ToolchainSpec) -> Vec<SdkComponent> {
        let mut components = vec![
            SdkComponent::BuildTools(spec.build_tools_version.clone()),
            SdkComponent::PlatformTools,
            SdkComponent::Platform(spec.sdk_version.clone()),
        ];

        if let Some(ndk) = spec.ndk() {
            components.push(SdkComponent::Ndk(ndk.to_string()));
        }
        if let Some(cmake) = spec.cmake() {
            components.push(SdkComponent::Cmake(cmake.to_string()));
        }

        components
    }
}

/// One component that did not install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentFailure {
    pub package: String,
    pub reason: String,
}

impl fmt::Display for ComponentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.package, self.reason)
    }
}

fn describe_failures(failures: &[ComponentFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// SDK Manager errors
#[derive(Debug, thiserror::Error)]
pub enum SdkManagerError {
    #[error("SDK not found at {0}")]
    SdkNotFound(PathBuf),
    #[error("sdkmanager not found under {0}")]
    SdkManagerNotFound(PathBuf),
    #[error("Command failed: {0}")]
    CommandFailed(String),
    #[error("Failed to install {} component(s): {}", .failures.len(), describe_failures(.failures))]
    InstallFailed { failures: Vec<ComponentFailure> },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SdkManagerError> for ProvisionError {
    fn from(err: SdkManagerError) -> Self {
        ProvisionError::Install(err.to_string())
    }
}

/// Answers fed to interactive prompts
const PROMPT_ANSWERS: usize = 20;

/// Android SDK Manager wrapper
pub struct SdkManager {
    sdk_root: PathBuf,
    sdkmanager_path: PathBuf,
}

impl SdkManager {
    /// Create a new SDK manager
    pub fn new(sdk_root: PathBuf) -> Result<Self, SdkManagerError> {
        if !sdk_root.exists() {
            return Err(SdkManagerError::SdkNotFound(sdk_root));
        }

        let sdkmanager_path = Self::find_sdkmanager(&sdk_root)?;

        Ok(Self::with_executable(sdk_root, sdkmanager_path))
    }

    /// Create an SDK manager around a known `sdkmanager` executable
    pub fn with_executable(sdk_root: PathBuf, sdkmanager_path: PathBuf) -> Self {
        Self {
            sdk_root,
            sdkmanager_path,
        }
    }

    /// Find the sdkmanager executable
    pub fn find_sdkmanager(sdk_root: &Path) -> Result<PathBuf, SdkManagerError> {
        let exe_name = if cfg!(windows) { "sdkmanager.bat" } else { "sdkmanager" };

        // Try cmdline-tools/latest
        let path = sdk_root.join("cmdline-tools").join("latest").join("bin").join(exe_name);
        if path.exists() {
            return Ok(path);
        }

        // Try cmdline-tools/X.X (versioned)
        let cmdline_tools = sdk_root.join("cmdline-tools");
        if let Ok(entries) = std::fs::read_dir(&cmdline_tools) {
            for entry in entries.flatten() {
                let path = entry.path().join("bin").join(exe_name);
                if path.exists() {
                    return Ok(path);
                }
            }
        }

        // Try tools directory (legacy)
        let path = sdk_root.join("tools").join("bin").join(exe_name);
        if path.exists() {
            return Ok(path);
        }

        Err(SdkManagerError::SdkManagerNotFound(sdk_root.to_path_buf()))
    }

    /// Create the base command with environment variables
    fn create_command(&self) -> Command {
        let mut cmd = Command::new(&self.sdkmanager_path);

        cmd.arg(format!("--sdk_root={}", self.sdk_root.display()));
        cmd.env("ANDROID_SDK_ROOT", &self.sdk_root);
        cmd.env("ANDROID_HOME", &self.sdk_root);

        cmd.kill_on_drop(true);
        cmd
    }

    /// Answer `y` to every prompt, then close stdin
    async fn answer_prompts(child: &mut tokio::process::Child) {
        if let Some(mut stdin) = child.stdin.take() {
            for _ in 0..PROMPT_ANSWERS {
                // the tool may exit before reading everything
                if stdin.write_all(b"y\n").await.is_err() {
                    break;
                }
            }
        }
    }

    /// Accept all licenses
    pub async fn accept_licenses(&self) -> Result<(), SdkManagerError> {
        info!("Accepting Android SDK licenses...");

        let mut child = self
            .create_command()
            .arg("--licenses")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        Self::answer_prompts(&mut child).await;

        let output = child.wait_with_output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SdkManagerError::CommandFailed(format!(
                "--licenses exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        info!("Licenses accepted");
        Ok(())
    }

    /// Install a single component
    pub async fn install_component(&self, component: &SdkComponent) -> Result<(), SdkManagerError> {
        let package = component.package_name();
        info!("Installing {}", package);

        let mut child = self
            .create_command()
            .arg(&package)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        Self::answer_prompts(&mut child).await;

        let output = child.wait_with_output().await?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!("sdkmanager: {}", line);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SdkManagerError::CommandFailed(format!(
                "{} exited with {:?}: {}",
                package,
                output.status.code(),
                stderr.trim()
            )));
        }

        debug!("Installed {}", package);
        Ok(())
    }

    /// Install every component concurrently, one `sdkmanager` process each.
    /// Waits for all of them and reports every failure.
    pub async fn install_all(&self, components: &[SdkComponent]) -> Result<(), SdkManagerError> {
        let packages: Vec<String> = components.iter().map(|c| c.package_name()).collect();
        info!("Installing SDK packages: {:?}", packages);

        let results = join_all(components.iter().map(|c| self.install_component(c))).await;

        let failures: Vec<ComponentFailure> = packages
            .into_iter()
            .zip(results)
            .filter_map(|(package, result)| {
                result.err().map(|e| ComponentFailure {
                    package,
                    reason: e.to_string(),
                })
            })
            .collect();

        if !failures.is_empty() {
            return Err(SdkManagerError::InstallFailed { failures });
        }

        info!("SDK packages installed successfully");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn test_component_package_name() {
        assert_eq!(
            SdkComponent::Platform("34".into()).package_name(),
            "platforms;android-34"
        );
        assert_eq!(
            SdkComponent::BuildTools("34.0.0".into()).package_name(),
            "build-tools;34.0.0"
        );
        assert_eq!(SdkComponent::Cmake("3.22.1".into()).package_name(), "cmake;3.22.1");
        assert_eq!(SdkComponent::Ndk("25.2.9519653".into()).package_name(), "ndk;25.2.9519653");
    }

    #[test]
    fn test_components_for_toolchain() {
        let spec = ToolchainSpec::new("33", "33.0.0");
        assert_eq!(
            SdkComponent::for_toolchain(&spec),
            vec![
                SdkComponent::BuildTools("33.0.0".into()),
                SdkComponent::PlatformTools,
                SdkComponent::Platform("33".into()),
            ]
        );

        let spec = spec.with_ndk("25.2.9519653").with_cmake("3.22.1");
        let packages: Vec<String> = SdkComponent::for_toolchain(&spec)
            .iter()
            .map(SdkComponent::package_name)
            .collect();
        assert_eq!(packages[3..], ["ndk;25.2.9519653".to_string(), "cmake;3.22.1".to_string()]);
    }

    #[test]
    fn test_missing_sdkmanager() {
        let tmp = tempfile::tempdir().unwrap();
        let err = SdkManager::new(tmp.path().to_path_buf()).err().unwrap();
        assert!(matches!(err, SdkManagerError::SdkManagerNotFound(_)));

        let err = SdkManager::new(tmp.path().join("missing")).err().unwrap();
        assert!(matches!(err, SdkManagerError::SdkNotFound(_)));
    }

    /// Install a fake `sdkmanager` at `cmdline-tools/latest/bin` that creates
    /// a marker file per package and fails for arguments matching `fail_case`
    /// (a shell `case` pattern, e.g. a package or `--licenses`).
    #[cfg(unix)]
    pub(crate) fn install_fake_sdkmanager(sdk_root: &Path, fail_case: Option<&str>) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let fail_branch = fail_case
            .map(|pattern| format!("    {}) echo \"cannot install $arg\" >&2; exit 3 ;;\n", pattern))
            .unwrap_or_default();
        let script = format!(
            r#"#!/bin/sh
root=""
pkg=""
for arg in "$@"; do
  case "$arg" in
    --sdk_root=*) root="${{arg#--sdk_root=}}" ;;
{fail_branch}    --licenses) mkdir -p "$root/licenses"; echo accepted > "$root/licenses/android-sdk-license"; exit 0 ;;
    *) pkg="$arg" ;;
  esac
done
dir="$root/$(echo "$pkg" | tr ';' '/')"
mkdir -p "$dir"
echo "$pkg" > "$dir/package.txt"
echo "Installed $pkg"
"#
        );

        let bin = sdk_root.join("cmdline-tools").join("latest").join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let path = bin.join("sdkmanager");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_all_runs_every_component() {
        let tmp = tempfile::tempdir().unwrap();
        let sdk_root = tmp.path().to_path_buf();
        install_fake_sdkmanager(&sdk_root, None);

        let manager = SdkManager::new(sdk_root.clone()).unwrap();
        manager.accept_licenses().await.unwrap();
        assert!(sdk_root.join("licenses/android-sdk-license").exists());

        let spec = ToolchainSpec::new("33", "33.0.0").with_cmake("3.22.1");
        manager
            .install_all(&SdkComponent::for_toolchain(&spec))
            .await
            .unwrap();

        for dir in ["build-tools/33.0.0", "platform-tools", "platforms/android-33", "cmake/3.22.1"] {
            assert!(sdk_root.join(dir).join("package.txt").exists(), "{}", dir);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rejected_licenses_fail() {
        let tmp = tempfile::tempdir().unwrap();
        let sdk_root = tmp.path().to_path_buf();
        install_fake_sdkmanager(&sdk_root, Some("--licenses"));

        let manager = SdkManager::new(sdk_root.clone()).unwrap();
        let err = manager.accept_licenses().await.unwrap_err();

        assert!(matches!(err, SdkManagerError::CommandFailed(ref msg) if msg.contains("--licenses")));
        assert!(!sdk_root.join("licenses").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_all_reports_every_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let sdk_root = tmp.path().to_path_buf();
        install_fake_sdkmanager(&sdk_root, Some(r"ndk\;*|cmake\;*"));

        let manager = SdkManager::new(sdk_root.clone()).unwrap();
        let spec = ToolchainSpec::new("33", "33.0.0")
            .with_ndk("25.2.9519653")
            .with_cmake("3.22.1");

        let err = manager
            .install_all(&SdkComponent::for_toolchain(&spec))
            .await
            .unwrap_err();

        match &err {
            SdkManagerError::InstallFailed { failures } => {
                let packages: Vec<&str> = failures.iter().map(|f| f.package.as_str()).collect();
                assert_eq!(packages, ["ndk;25.2.9519653", "cmake;3.22.1"]);
                assert!(failures[0].reason.contains("cannot install"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(err.to_string().starts_with("Failed to install 2 component(s)"));

        // the healthy components still ran
        assert!(sdk_root.join("platforms/android-33/package.txt").exists());
    }
}
