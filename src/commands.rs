//! CLI commands for sdk-provision
//!
//! Each command corresponds to one pipeline step.

use std::path::PathBuf;

use anyhow::Result;
use sdk_provision_android_toolchain::{
    CacheEntry, CacheGateway, CacheKey, CiExporter, DownloadConfig, EnvManager, EnvironmentConfig,
    LocalCacheStore, ProvisionOutcome, Provisioner, ToolchainDownloader,
};
use sdk_provision_core::{ProvisionConfig, RunState};
use tracing::info;

fn local_gateway(config: &ProvisionConfig) -> Result<CacheGateway<LocalCacheStore>> {
    Ok(CacheGateway::new(LocalCacheStore::new(config.cache_dir()?)))
}

fn cached_dirs(config: &ProvisionConfig) -> Result<Vec<PathBuf>> {
    Ok(vec![config.sdk_home()?])
}

/// Full provisioning: restore, install on miss, save, export environment
pub struct InstallCommand {
    pub config: ProvisionConfig,
    pub exporter: CiExporter,
}

impl InstallCommand {
    /// Execute the install command
    pub async fn execute(&self) -> Result<ProvisionOutcome> {
        let spec = self.config.toolchain_spec()?;
        let sdk_home = self.config.sdk_home()?;
        let mut state = RunState::open(self.config.state_file()).await?;

        info!("Provisioning Android SDK into {:?}", sdk_home);

        let downloader = ToolchainDownloader::new(DownloadConfig::default())?;
        let provisioner = Provisioner::new(local_gateway(&self.config)?, downloader, sdk_home)
            .use_cache(self.config.cache.enabled);

        let outcome = provisioner.run(&spec, &mut state).await?;

        let env = EnvManager::new(EnvironmentConfig::for_toolchain(&outcome.sdk_home, &spec));
        self.exporter.export(&env)?;
        self.exporter
            .set_output("cache-hit", &outcome.cache_hit.to_string())?;
        self.exporter.set_output("cache-key", outcome.key.as_str())?;

        info!(
            "Android SDK ready (cache hit: {}, key: {})",
            outcome.cache_hit, outcome.key
        );
        Ok(outcome)
    }
}

/// Explicit cache restore of the SDK home
pub struct RestoreCommand {
    pub config: ProvisionConfig,
    pub exporter: CiExporter,
}

impl RestoreCommand {
    /// Execute the restore command
    pub async fn execute(&self) -> Result<Option<CacheEntry>> {
        let key = CacheKey::derive(&self.config.toolchain_spec()?);

        if !self.config.cache.enabled {
            info!("Cache disabled, not restoring");
            self.exporter.set_output("cache-hit", "false")?;
            return Ok(None);
        }

        let mut state = RunState::open(self.config.state_file()).await?;
        let entry = local_gateway(&self.config)?
            .restore(&cached_dirs(&self.config)?, &key, &mut state)
            .await?;

        self.exporter
            .set_output("cache-hit", &entry.is_some().to_string())?;
        self.exporter.set_output("cache-key", key.as_str())?;
        Ok(entry)
    }
}

/// Explicit cache save of the SDK home
pub struct SaveCommand {
    pub config: ProvisionConfig,
}

impl SaveCommand {
    /// Execute the save command
    pub async fn execute(&self) -> Result<Option<CacheEntry>> {
        let key = CacheKey::derive(&self.config.toolchain_spec()?);

        if !self.config.cache.enabled {
            info!("Cache disabled, not saving");
            return Ok(None);
        }

        let state = RunState::open(self.config.state_file()).await?;
        if let Some(restored) = CacheGateway::<LocalCacheStore>::restored_entry(&state)? {
            if restored.key == key {
                info!("Cache hit occurred on key {}, not saving cache", key);
                return Ok(None);
            }
        }

        let entry = local_gateway(&self.config)?
            .save(&cached_dirs(&self.config)?, &key)
            .await?;
        Ok(entry)
    }
}

/// Print the cache key for the requested toolchain
pub struct KeyCommand {
    pub config: ProvisionConfig,
}

impl KeyCommand {
    /// Execute the key command
    pub fn execute(&self) -> Result<CacheKey> {
        let key = CacheKey::derive(&self.config.toolchain_spec()?);
        println!("{}", key);
        Ok(key)
    }
}
