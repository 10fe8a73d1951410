//! Provisioner
//!
//! Runs one provisioning pass: restore the SDK home from the cache, and on a
//! miss install the requested components and save the result. Each step
//! finishes before the next one touches the SDK home.

use std::path::PathBuf;

use sdk_provision_core::{ProvisionError, RunState, ToolchainSpec};
use tracing::info;

use crate::cache::{CacheEntry, CacheGateway, CacheStore};
use crate::cache_key::CacheKey;
use crate::downloader::{Platform, ToolchainDownloader};
use crate::sdk_manager::{SdkComponent, SdkManager};

/// Result of a provisioning pass
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    pub key: CacheKey,
    pub sdk_home: PathBuf,
    /// The SDK home came from the cache and nothing was installed
    pub cache_hit: bool,
    /// Entry written by this pass; `None` on a hit, with the cache disabled,
    /// or when another job saved the key first
    pub saved: Option<CacheEntry>,
}

pub struct Provisioner<S> {
    gateway: CacheGateway<S>,
    downloader: ToolchainDownloader,
    sdk_home: PathBuf,
    use_cache: bool,
}

impl<S: CacheStore> Provisioner<S> {
    pub fn new(gateway: CacheGateway<S>, downloader: ToolchainDownloader, sdk_home: PathBuf) -> Self {
        Self {
            gateway,
            downloader,
            sdk_home,
            use_cache: true,
        }
    }

    /// Skip restore and save when `false`
    pub fn use_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    pub fn gateway(&self) -> &CacheGateway<S> {
        &self.gateway
    }

    /// Provision the SDK home for `spec`
    pub async fn run(
        &self,
        spec: &ToolchainSpec,
        state: &mut RunState,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let platform = Platform::current()?;
        let key = CacheKey::derive(spec);
        let dirs = vec![self.sdk_home.clone()];

        if self.use_cache {
            if self.gateway.restore(&dirs, &key, state).await?.is_some() {
                return Ok(ProvisionOutcome {
                    key,
                    sdk_home: self.sdk_home.clone(),
                    cache_hit: true,
                    saved: None,
                });
            }
        } else {
            info!("Cache disabled, installing without restore");
        }

        self.install(spec, platform).await?;

        let saved = if self.use_cache {
            self.gateway.save(&dirs, &key).await?
        } else {
            None
        };

        Ok(ProvisionOutcome {
            key,
            sdk_home: self.sdk_home.clone(),
            cache_hit: false,
            saved,
        })
    }

    async fn install(&self, spec: &ToolchainSpec, platform: Platform) -> Result<(), ProvisionError> {
        tokio::fs::create_dir_all(&self.sdk_home).await?;

        let sdkmanager = match SdkManager::find_sdkmanager(&self.sdk_home) {
            Ok(path) => path,
            Err(_) => {
                let latest = self
                    .downloader
                    .install_cmdline_tools(&self.sdk_home, platform)
                    .await?;
                latest.join("bin").join(platform.sdkmanager_name())
            }
        };

        let manager = SdkManager::with_executable(self.sdk_home.clone(), sdkmanager);
        manager.accept_licenses().await?;
        manager.install_all(&SdkComponent::for_toolchain(spec)).await?;

        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::cache::LocalCacheStore;
    use crate::downloader::DownloadConfig;
    use crate::sdk_manager::tests::install_fake_sdkmanager;

    struct Fixture {
        tmp: tempfile::TempDir,
        sdk_home: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let sdk_home = tmp.path().join("android-sdk");
            Self { tmp, sdk_home }
        }

        fn provisioner(&self) -> Provisioner<LocalCacheStore> {
            let store = LocalCacheStore::new(self.tmp.path().join("cache"));
            let downloader = ToolchainDownloader::new(DownloadConfig {
                work_dir: self.tmp.path().join("work"),
                ..Default::default()
            })
            .unwrap();
            Provisioner::new(CacheGateway::new(store), downloader, self.sdk_home.clone())
        }

        async fn state(&self) -> RunState {
            RunState::open(self.tmp.path().join("state.json")).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_miss_installs_and_saves() {
        let fx = Fixture::new();
        install_fake_sdkmanager(&fx.sdk_home, None);
        let provisioner = fx.provisioner();
        let mut state = fx.state().await;
        let spec = ToolchainSpec::new("33", "33.0.0").with_ndk("25.2.9519653");

        let outcome = provisioner.run(&spec, &mut state).await.unwrap();

        assert!(!outcome.cache_hit);
        assert_eq!(outcome.key.as_str(), "33-33.0.0-25.2.9519653-v3.2");
        assert!(outcome.saved.is_some());
        assert!(fx.sdk_home.join("ndk/25.2.9519653/package.txt").exists());
        assert!(fx.sdk_home.join("licenses/android-sdk-license").exists());
        assert!(provisioner.gateway().store().contains(&outcome.key).await);
        assert_eq!(CacheGateway::<LocalCacheStore>::restored_entry(&state).unwrap(), None);
    }

    #[tokio::test]
    async fn test_hit_skips_install() {
        let fx = Fixture::new();
        let provisioner = fx.provisioner();
        let spec = ToolchainSpec::new("33", "33.0.0");
        let key = CacheKey::derive(&spec);

        std::fs::create_dir_all(fx.sdk_home.join("platforms/android-33")).unwrap();
        std::fs::write(fx.sdk_home.join("platforms/android-33/android.jar"), "jar").unwrap();
        provisioner
            .gateway()
            .save(&[fx.sdk_home.clone()], &key)
            .await
            .unwrap();
        std::fs::remove_dir_all(&fx.sdk_home).unwrap();

        // no sdkmanager on disk: any install attempt would have to download
        let mut state = fx.state().await;
        let outcome = provisioner.run(&spec, &mut state).await.unwrap();

        assert!(outcome.cache_hit);
        assert!(outcome.saved.is_none());
        assert!(fx.sdk_home.join("platforms/android-33/android.jar").exists());
        assert!(CacheGateway::<LocalCacheStore>::restored_entry(&state)
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_failed_install_is_not_cached() {
        let fx = Fixture::new();
        install_fake_sdkmanager(&fx.sdk_home, Some(r"cmake\;*"));
        let provisioner = fx.provisioner();
        let mut state = fx.state().await;
        let spec = ToolchainSpec::new("33", "33.0.0").with_cmake("3.22.1");

        let err = provisioner.run(&spec, &mut state).await.unwrap_err();

        assert!(matches!(err, ProvisionError::Install(ref msg) if msg.contains("cmake;3.22.1")));
        assert!(!provisioner.gateway().store().contains(&CacheKey::derive(&spec)).await);
    }

    #[tokio::test]
    async fn test_rejected_licenses_stop_the_run() {
        let fx = Fixture::new();
        install_fake_sdkmanager(&fx.sdk_home, Some("--licenses"));
        let provisioner = fx.provisioner();
        let mut state = fx.state().await;
        let spec = ToolchainSpec::new("33", "33.0.0");

        let err = provisioner.run(&spec, &mut state).await.unwrap_err();

        assert!(matches!(err, ProvisionError::Install(ref msg) if msg.contains("--licenses")));
        assert!(!fx.sdk_home.join("platforms/android-33").exists());
        assert!(!provisioner.gateway().store().contains(&CacheKey::derive(&spec)).await);
    }

    #[tokio::test]
    async fn test_cache_disabled() {
        let fx = Fixture::new();
        install_fake_sdkmanager(&fx.sdk_home, None);
        let provisioner = fx.provisioner().use_cache(false);
        let mut state = fx.state().await;
        let spec = ToolchainSpec::new("34", "34.0.0");

        let outcome = provisioner.run(&spec, &mut state).await.unwrap();

        assert!(!outcome.cache_hit);
        assert!(outcome.saved.is_none());
        assert!(fx.sdk_home.join("platforms/android-34/package.txt").exists());
        assert!(!provisioner.gateway().store().contains(&outcome.key).await);
    }

    #[tokio::test]
    async fn test_second_run_hits() {
        let fx = Fixture::new();
        install_fake_sdkmanager(&fx.sdk_home, None);
        let provisioner = fx.provisioner();
        let spec = ToolchainSpec::new("33", "33.0.0");

        let mut state = fx.state().await;
        provisioner.run(&spec, &mut state).await.unwrap();

        let mut state = fx.state().await;
        let outcome = provisioner.run(&spec, &mut state).await.unwrap();
        assert!(outcome.cache_hit);
        assert!(fx.sdk_home.join("build-tools/33.0.0/package.txt").exists());
    }
}
