//! Toolchain Cache
//!
//! Snapshots the SDK home into a cache store under a [`CacheKey`] and
//! materializes it back on later runs.
//!
//! [`CacheStore`] is the storage seam. [`LocalCacheStore`] keeps each entry as
//! a gzip'd tarball plus a JSON metadata file inside a cache root directory.
//! [`CacheGateway`] sits in front of a store: it logs hits and misses, records
//! the restore outcome in the [`RunState`], and treats a reserve conflict on
//! save as "already cached".

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sdk_provision_core::{ProvisionError, RunState};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cache_key::CacheKey;

/// Run state key holding the outcome of the last restore
pub const RESTORED_ENTRY_STATE: &str = "restored-cache-entry";

/// Metadata describing a stored snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// Directories captured, in archive order
    pub paths: Vec<PathBuf>,
    /// Compressed archive size in bytes
    pub archive_size: u64,
    /// Regular files captured across all directories
    pub file_count: u64,
    /// SHA-256 of the compressed archive
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Unable to reserve cache with key {key}, another job may be creating this cache")]
    ReserveConflict { key: String },
    #[error("Path to cache does not exist: {0}")]
    MissingPath(PathBuf),
    #[error("No paths given to cache")]
    NoPaths,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Archive error: {0}")]
    Archive(String),
    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("Run state error: {0}")]
    State(#[from] ProvisionError),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl CacheError {
    /// The key already has (or is getting) a saved entry
    pub fn is_reserve_conflict(&self) -> bool {
        matches!(self, CacheError::ReserveConflict { .. })
    }
}

impl From<CacheError> for ProvisionError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::State(inner) => inner,
            other => ProvisionError::Cache(other.to_string()),
        }
    }
}

/// Storage backend for directory snapshots
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Materialize the entry saved under `key` into `paths`, overwriting their
    /// contents. `Ok(None)` on a miss, with `paths` left untouched.
    async fn restore(&self, paths: &[PathBuf], key: &CacheKey)
        -> Result<Option<CacheEntry>, CacheError>;

    /// Snapshot `paths` under `key`. Fails with [`CacheError::ReserveConflict`]
    /// when the key is already taken.
    async fn save(&self, paths: &[PathBuf], key: &CacheKey) -> Result<CacheEntry, CacheError>;
}

/// Filesystem-backed cache store
#[derive(Debug, Clone)]
pub struct LocalCacheStore {
    root: PathBuf,
}

impl LocalCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Whether a committed entry exists for `key`
    pub async fn contains(&self, key: &CacheKey) -> bool {
        tokio::fs::metadata(self.metadata_path(key)).await.is_ok()
    }

    fn entry_id(key: &CacheKey) -> String {
        hex::encode(Sha256::digest(key.as_str().as_bytes()))
    }

    fn archive_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.tar.gz", Self::entry_id(key)))
    }

    fn metadata_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.json", Self::entry_id(key)))
    }

    fn reserve_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.reserve", Self::entry_id(key)))
    }

    async fn reserve(&self, key: &CacheKey) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.root).await?;

        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.reserve_path(key))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(CacheError::ReserveConflict {
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn commit(&self, key: &CacheKey, paths: Vec<PathBuf>) -> Result<CacheEntry, CacheError> {
        let archive = self.archive_path(key);
        let tmp = archive.with_extension("gz.tmp");

        let written = {
            let paths = paths.clone();
            let tmp = tmp.clone();
            tokio::task::spawn_blocking(move || write_archive(&paths, &tmp)).await?
        };
        let (archive_size, sha256) = match written {
            Ok(summary) => summary,
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(e);
            }
        };
        tokio::fs::rename(&tmp, &archive).await?;

        let entry = CacheEntry {
            key: key.clone(),
            file_count: count_files(&paths),
            paths,
            archive_size,
            sha256,
            created_at: Utc::now(),
        };
        tokio::fs::write(self.metadata_path(key), serde_json::to_vec_pretty(&entry)?).await?;

        Ok(entry)
    }
}

#[async_trait]
impl CacheStore for LocalCacheStore {
    async fn restore(
        &self,
        paths: &[PathBuf],
        key: &CacheKey,
    ) -> Result<Option<CacheEntry>, CacheError> {
        let paths = normalize_paths(paths)?;

        let metadata = match tokio::fs::read(self.metadata_path(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: CacheEntry = serde_json::from_slice(&metadata)?;

        if entry.paths != paths {
            debug!(
                "Entry for {} was saved for {:?}, requested {:?}; treating as a miss",
                key, entry.paths, paths
            );
            return Ok(None);
        }

        let archive = self.archive_path(key);
        tokio::task::spawn_blocking(move || unpack_archive(&archive, &paths)).await??;

        Ok(Some(entry))
    }

    async fn save(&self, paths: &[PathBuf], key: &CacheKey) -> Result<CacheEntry, CacheError> {
        let paths = normalize_paths(paths)?;
        for path in &paths {
            if !tokio::fs::try_exists(path).await? {
                return Err(CacheError::MissingPath(path.clone()));
            }
        }

        self.reserve(key).await?;

        match self.commit(key, paths).await {
            Ok(entry) => {
                debug!(
                    "Stored {} files ({} bytes) for {}",
                    entry.file_count, entry.archive_size, key
                );
                Ok(entry)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(self.reserve_path(key)).await;
                Err(e)
            }
        }
    }
}

/// Sort and de-duplicate so the same set of directories always maps to the
/// same archive layout.
fn normalize_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>, CacheError> {
    if paths.is_empty() {
        return Err(CacheError::NoPaths);
    }

    let mut paths = paths.to_vec();
    paths.sort();
    paths.dedup();
    Ok(paths)
}

fn count_files(paths: &[PathBuf]) -> u64 {
    paths
        .iter()
        .flat_map(|path| WalkDir::new(path).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.file_type().is_file())
        .count() as u64
}

/// Write every directory under its index as the archive prefix. Returns the
/// archive size and digest.
fn write_archive(paths: &[PathBuf], target: &Path) -> Result<(u64, String), CacheError> {
    let file = fs::File::create(target)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);

    for (index, path) in paths.iter().enumerate() {
        builder.append_dir_all(index.to_string(), path)?;
    }

    let file = builder.into_inner()?.finish()?;
    file.sync_all()?;

    let mut hasher = Sha256::new();
    io::copy(&mut fs::File::open(target)?, &mut hasher)?;
    let size = fs::metadata(target)?.len();

    Ok((size, hex::encode(hasher.finalize())))
}

/// Unpack into sibling staging directories first, so a missing or corrupt
/// archive leaves `paths` as they were.
fn unpack_archive(archive: &Path, paths: &[PathBuf]) -> Result<(), CacheError> {
    let file = fs::File::open(archive)?;
    let staging: Vec<PathBuf> = paths.iter().map(|path| staging_dir(path)).collect();

    if let Err(e) = stage_entries(file, &staging) {
        for dir in &staging {
            let _ = fs::remove_dir_all(dir);
        }
        return Err(e);
    }

    for (path, dir) in paths.iter().zip(&staging) {
        if path.exists() {
            fs::remove_dir_all(path)?;
        }
        fs::rename(dir, path)?;
    }

    Ok(())
}

fn staging_dir(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string());
    path.with_file_name(format!(".{}.restoring", name))
}

fn stage_entries(file: fs::File, targets: &[PathBuf]) -> Result<(), CacheError> {
    for dir in targets {
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        fs::create_dir_all(dir)?;
    }

    let mut tar = tar::Archive::new(GzDecoder::new(file));

    for entry in tar.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();

        let mut components = entry_path.components();
        let target_dir = match components.next() {
            Some(Component::Normal(prefix)) => prefix
                .to_str()
                .and_then(|s| s.parse::<usize>().ok())
                .and_then(|index| targets.get(index)),
            _ => None,
        }
        .ok_or_else(|| {
            CacheError::Archive(format!("unexpected entry {}", entry_path.display()))
        })?;

        let relative = components.as_path();
        if relative.as_os_str().is_empty() {
            continue;
        }
        if relative.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(CacheError::Archive(format!(
                "entry escapes its directory: {}",
                entry_path.display()
            )));
        }

        let target = target_dir.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
    }

    Ok(())
}

/// Restore/save front-end used by the provisioning steps
pub struct CacheGateway<S> {
    store: S,
}

impl<S: CacheStore> CacheGateway<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Restore `key` into `paths` and record the outcome in `state`
    pub async fn restore(
        &self,
        paths: &[PathBuf],
        key: &CacheKey,
        state: &mut RunState,
    ) -> Result<Option<CacheEntry>, CacheError> {
        let entry = self.store.restore(paths, key).await?;

        match &entry {
            Some(_) => info!("Cache restored from key: {}", key),
            None => info!("Cache not found for key: {}", key),
        }

        state.set(RESTORED_ENTRY_STATE, &entry).await?;
        Ok(entry)
    }

    /// The entry recorded by the most recent [`CacheGateway::restore`] of this run
    pub fn restored_entry(state: &RunState) -> Result<Option<CacheEntry>, CacheError> {
        Ok(state.get(RESTORED_ENTRY_STATE)?)
    }

    /// Save `paths` under `key`. A reserve conflict means the key is already
    /// cached and yields `Ok(None)`; other failures propagate.
    pub async fn save(
        &self,
        paths: &[PathBuf],
        key: &CacheKey,
    ) -> Result<Option<CacheEntry>, CacheError> {
        match self.store.save(paths, key).await {
            Ok(entry) => {
                info!("Cache saved with key: {}", key);
                Ok(Some(entry))
            }
            Err(e) if e.is_reserve_conflict() => {
                warn!("{}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
