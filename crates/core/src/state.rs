//! Run State
//!
//! A small key-value store scoped to one pipeline run. The restore step writes
//! into it and later steps (in the same process or in a later invocation of
//! the binary) read from it. Values are stored as JSON in a single file.

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ProvisionError, Result};

/// Environment variable that overrides the state file location
pub const STATE_FILE_ENV: &str = "SDK_PROVISION_STATE_FILE";

const STATE_FILE_STEM: &str = "sdk-provision-state";

/// Persisted run state
#[derive(Debug)]
pub struct RunState {
    path: PathBuf,
    values: Map<String, Value>,
}

impl RunState {
    /// Default location: `$SDK_PROVISION_STATE_FILE`, else a file named after
    /// the CI run in the runner temp directory (or the system temp directory).
    pub fn default_path() -> PathBuf {
        default_path_from(|name| std::env::var(name).ok())
    }

    /// Open the state stored at `path`, starting empty if the file is missing
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let values = match tokio::fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => Map::new(),
            Ok(contents) => match serde_json::from_str::<Value>(&contents)? {
                Value::Object(map) => map,
                other => {
                    return Err(ProvisionError::State(format!(
                        "{} does not hold a JSON object (found {})",
                        path.display(),
                        other
                    )))
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };

        debug!("Opened run state {:?} ({} keys)", path, values.len());
        Ok(Self { path, values })
    }

    /// Read and deserialize `key`. Missing keys and falsy values are `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.values.get(key) {
            Some(value) if !is_falsy(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            _ => Ok(None),
        }
    }

    /// Serialize `value` under `key` and persist the whole state
    pub async fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        self.values.insert(key.to_string(), serde_json::to_value(value)?);
        self.persist().await
    }

    async fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let contents = serde_json::to_string_pretty(&self.values)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!("Run state saved to {:?}", self.path);
        Ok(())
    }
}

fn default_path_from(var: impl Fn(&str) -> Option<String>) -> PathBuf {
    let var = |name: &str| var(name).filter(|value| !value.is_empty());

    if let Some(path) = var(STATE_FILE_ENV) {
        return PathBuf::from(path);
    }

    // a state file left by an earlier run must not leak into this one
    let file_name = match (var("GITHUB_RUN_ID"), var("GITHUB_RUN_ATTEMPT")) {
        (Some(id), Some(attempt)) => format!("{}-{}-{}.json", STATE_FILE_STEM, id, attempt),
        (Some(id), None) => format!("{}-{}.json", STATE_FILE_STEM, id),
        _ => format!("{}.json", STATE_FILE_STEM),
    };

    var("RUNNER_TEMP")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(file_name)
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}
