//! Toolchain Downloader
//!
//! Downloads and extracts the Android SDK command-line tools, which carry the
//! `sdkmanager` used to install everything else.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::Client;
use sdk_provision_core::ProvisionError;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Command-line tools build published for every supported platform
pub const CMDLINE_TOOLS_VERSION: &str = "11076708";

const REPOSITORY_URL: &str = "https://dl.google.com/android/repository";

/// Runner platforms with a published command-line tools archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    /// Platform of the current process
    pub fn current() -> Result<Self, DownloadError> {
        Self::from_os(std::env::consts::OS)
    }

    /// Map a `std::env::consts::OS` value
    pub fn from_os(os: &str) -> Result<Self, DownloadError> {
        match os {
            "linux" => Ok(Platform::Linux),
            "macos" => Ok(Platform::MacOs),
            "windows" => Ok(Platform::Windows),
            other => Err(DownloadError::UnsupportedPlatform(other.to_string())),
        }
    }

    /// Name used in Google's archive file names
    pub fn archive_tag(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::MacOs => "mac",
            Platform::Windows => "win",
        }
    }

    /// File name of the `sdkmanager` launcher
    pub fn sdkmanager_name(&self) -> &'static str {
        match self {
            Platform::Windows => "sdkmanager.bat",
            _ => "sdkmanager",
        }
    }
}

/// SDK command-line tools info
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdlineToolsInfo {
    pub version: String,
    pub url: String,
}

impl CmdlineToolsInfo {
    pub fn for_platform(platform: Platform) -> Self {
        Self {
            version: CMDLINE_TOOLS_VERSION.to_string(),
            url: format!(
                "{}/commandlinetools-{}-{}_latest.zip",
                REPOSITORY_URL,
                platform.archive_tag(),
                CMDLINE_TOOLS_VERSION
            ),
        }
    }
}

/// Download configuration
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Where archives are staged before extraction
    pub work_dir: PathBuf,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::var("RUNNER_TEMP")
                .ok()
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            user_agent: format!("sdk-provision/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Download error types
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Extraction failed: {0}")]
    Extraction(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

impl From<DownloadError> for ProvisionError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::UnsupportedPlatform(os) => ProvisionError::UnsupportedPlatform(os),
            other => ProvisionError::Download(other.to_string()),
        }
    }
}

/// Toolchain downloader
pub struct ToolchainDownloader {
    client: Client,
    config: DownloadConfig,
}

impl ToolchainDownloader {
    /// Create a new downloader
    pub fn new(config: DownloadConfig) -> Result<Self, DownloadError> {
        let client = Client::builder().user_agent(&config.user_agent).build()?;
        Ok(Self { client, config })
    }

    /// Download a file
    pub async fn download_file(&self, url: &str, target: &Path) -> Result<(), DownloadError> {
        info!("Downloading {} to {:?}", url, target);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(DownloadError::InvalidResponse(format!(
                "HTTP {} for {}",
                response.status(),
                url
            )));
        }

        let total_size = response.content_length().unwrap_or(0);
        let mut downloaded: u64 = 0;

        let mut file = tokio::fs::File::create(target).await?;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
        }

        file.flush().await?;

        debug!("Downloaded {} of {} bytes", downloaded, total_size);
        Ok(())
    }

    /// Extract a ZIP file
    pub async fn extract_zip(archive: &Path, target_dir: &Path) -> Result<(), DownloadError> {
        info!("Extracting {:?} to {:?}", archive, target_dir);

        let archive = archive.to_path_buf();
        let target_dir = target_dir.to_path_buf();

        // zip is synchronous
        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&archive)?;
            let mut zip = zip::ZipArchive::new(file)
                .map_err(|e| DownloadError::Extraction(e.to_string()))?;

            for i in 0..zip.len() {
                let mut entry = zip
                    .by_index(i)
                    .map_err(|e| DownloadError::Extraction(e.to_string()))?;

                let relative = entry.enclosed_name().map(Path::to_path_buf).ok_or_else(|| {
                    DownloadError::Extraction(format!("unsafe entry name {}", entry.name()))
                })?;
                let outpath = target_dir.join(relative);

                if entry.is_dir() {
                    std::fs::create_dir_all(&outpath)?;
                } else {
                    if let Some(parent) = outpath.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    let mut outfile = std::fs::File::create(&outpath)?;
                    std::io::copy(&mut entry, &mut outfile)?;
                }

                // Set permissions on Unix
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    if let Some(mode) = entry.unix_mode() {
                        std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))?;
                    }
                }
            }

            Ok(())
        })
        .await
        .map_err(|e| DownloadError::Extraction(e.to_string()))?
    }

    /// Fetch the archive at `url` and extract it into `dest`, returning `dest`
    pub async fn fetch_and_extract(&self, url: &str, dest: &Path) -> Result<PathBuf, DownloadError> {
        let file_name = url.rsplit('/').next().filter(|n| !n.is_empty()).unwrap_or("download.zip");
        let archive_path = self.config.work_dir.join(file_name);

        self.download_file(url, &archive_path).await?;
        Self::extract_downloaded(&archive_path, dest).await?;

        Ok(dest.to_path_buf())
    }

    /// Extract a downloaded archive into `dest`, then remove the archive.
    /// Extraction errors win over a failed cleanup.
    async fn extract_downloaded(archive_path: &Path, dest: &Path) -> Result<(), DownloadError> {
        let extracted = match tokio::fs::create_dir_all(dest).await {
            Ok(()) => Self::extract_zip(archive_path, dest).await,
            Err(e) => Err(e.into()),
        };

        if let Err(e) = tokio::fs::remove_file(archive_path).await {
            warn!("Failed to remove {:?}: {}", archive_path, e);
        }

        extracted
    }

    /// Download the command-line tools for `platform` into
    /// `<sdk_home>/cmdline-tools/latest`, returning that directory
    pub async fn install_cmdline_tools(
        &self,
        sdk_home: &Path,
        platform: Platform,
    ) -> Result<PathBuf, DownloadError> {
        let info = CmdlineToolsInfo::for_platform(platform);
        let staging = self.config.work_dir.join(format!("cmdline-tools-{}", info.version));

        if tokio::fs::try_exists(&staging).await? {
            tokio::fs::remove_dir_all(&staging).await?;
        }

        self.fetch_and_extract(&info.url, &staging).await?;
        let latest = layout_cmdline_tools(&staging, sdk_home).await?;

        info!(
            "Android SDK command-line tools {} installed to {:?}",
            info.version, latest
        );
        Ok(latest)
    }
}

/// Move the extracted `cmdline-tools` folder to `<sdk_home>/cmdline-tools/latest`,
/// where `sdkmanager` expects to live.
pub async fn layout_cmdline_tools(extracted: &Path, sdk_home: &Path) -> Result<PathBuf, DownloadError> {
    let source = extracted.join("cmdline-tools");
    if !tokio::fs::try_exists(&source).await? {
        return Err(DownloadError::Extraction(format!(
            "archive has no cmdline-tools directory under {:?}",
            extracted
        )));
    }

    let parent = sdk_home.join("cmdline-tools");
    let latest = parent.join("latest");
    tokio::fs::create_dir_all(&parent).await?;
    if tokio::fs::try_exists(&latest).await? {
        tokio::fs::remove_dir_all(&latest).await?;
    }
    tokio::fs::rename(&source, &latest).await?;
    let _ = tokio::fs::remove_dir_all(extracted).await;

    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_platform_from_os() {
        assert_eq!(Platform::from_os("linux").unwrap(), Platform::Linux);
        assert_eq!(Platform::from_os("macos").unwrap(), Platform::MacOs);
        assert_eq!(Platform::from_os("windows").unwrap(), Platform::Windows);

        let err = Platform::from_os("freebsd").unwrap_err();
        assert!(matches!(err, DownloadError::UnsupportedPlatform(ref os) if os == "freebsd"));
        assert!(matches!(
            ProvisionError::from(err),
            ProvisionError::UnsupportedPlatform(_)
        ));
    }

    #[test]
    fn test_cmdline_tools_urls() {
        assert_eq!(
            CmdlineToolsInfo::for_platform(Platform::Linux).url,
            "https://dl.google.com/android/repository/commandlinetools-linux-11076708_latest.zip"
        );
        assert_eq!(
            CmdlineToolsInfo::for_platform(Platform::MacOs).url,
            "https://dl.google.com/android/repository/commandlinetools-mac-11076708_latest.zip"
        );
        assert_eq!(
            CmdlineToolsInfo::for_platform(Platform::Windows).url,
            "https://dl.google.com/android/repository/commandlinetools-win-11076708_latest.zip"
        );
        assert_eq!(Platform::Windows.sdkmanager_name(), "sdkmanager.bat");
    }

    fn write_cmdline_tools_zip(path: &Path) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default().unix_permissions(0o755);

        zip.add_directory("cmdline-tools/bin/", options).unwrap();
        zip.start_file("cmdline-tools/bin/sdkmanager", options).unwrap();
        zip.write_all(b"#!/bin/sh\nexit 0\n").unwrap();
        zip.start_file("cmdline-tools/source.properties", options).unwrap();
        zip.write_all(b"Pkg.Revision=12.0\n").unwrap();
        zip.finish().unwrap();
    }

    #[tokio::test]
    async fn test_extract_and_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("tools.zip");
        write_cmdline_tools_zip(&archive);

        let staging = tmp.path().join("staging");
        ToolchainDownloader::extract_zip(&archive, &staging).await.unwrap();
        assert!(staging.join("cmdline-tools/bin/sdkmanager").exists());

        let sdk_home = tmp.path().join("sdk");
        let latest = layout_cmdline_tools(&staging, &sdk_home).await.unwrap();

        assert_eq!(latest, sdk_home.join("cmdline-tools").join("latest"));
        assert!(latest.join("bin/sdkmanager").exists());
        assert!(latest.join("source.properties").exists());
        assert!(!staging.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(latest.join("bin/sdkmanager")).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[tokio::test]
    async fn test_corrupt_download_reports_extraction_error() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("tools.zip");
        std::fs::write(&archive, b"not a zip archive").unwrap();

        let err = ToolchainDownloader::extract_downloaded(&archive, &tmp.path().join("staging"))
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Extraction(_)), "{}", err);
        assert!(!archive.exists());
    }

    #[tokio::test]
    async fn test_layout_rejects_unexpected_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let err = layout_cmdline_tools(tmp.path(), &tmp.path().join("sdk")).await.unwrap_err();
        assert!(matches!(err, DownloadError::Extraction(_)));
    }
}
