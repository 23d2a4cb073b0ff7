//! Snapshot-to-disk persistence primitives.
//!
//! Every store here is an in-process, `Mutex`-guarded structure that keeps
//! its authoritative state in memory and writes a full snapshot to disk
//! after every committing mutation. This gives single-process callers the
//! same total-order guarantee a transactional database would, without an
//! external storage dependency.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("io error reading/writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode snapshot at {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),
}

pub type PersistResult<T> = Result<T, PersistError>;

/// A generic JSON-snapshot-backed keyed store, one file per domain.
///
/// Mirrors the `JsonStore` convention used throughout this lineage: a
/// single file holding a `HashMap<String, T>`, loaded eagerly and rewritten
/// wholesale on every save. Callers are expected to hold their own lock
/// around the in-memory copy; this type only knows how to get bytes on and
/// off disk.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(state_dir: impl AsRef<Path>, domain: &str) -> Self {
        Self {
            path: state_dir.as_ref().join(format!("{domain}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load<T>(&self) -> PersistResult<HashMap<String, T>>
    where
        T: DeserializeOwned,
    {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                if bytes.is_empty() {
                    return Ok(HashMap::new());
                }
                serde_json::from_slice(&bytes).map_err(|source| PersistError::Decode {
                    path: self.path.clone(),
                    source,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(source) => Err(PersistError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    pub async fn save<T>(&self, data: &HashMap<String, T>) -> PersistResult<()>
    where
        T: Serialize,
    {
        let bytes = serde_json::to_vec_pretty(data).map_err(PersistError::Encode)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| PersistError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|source| PersistError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| PersistError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

/// A single committed configuration version.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConfigRow {
    pub id: u64,
    pub etag: String,
    pub config: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Append-only, monotonically-versioned history of configuration writes,
/// snapshotted to disk after every append.
///
/// Callers serialize access through their own lock (see
/// `cfgmesh-controller::state`); this type is not internally synchronized
/// beyond what's needed to make `append`/`latest` atomic with respect to
/// the snapshot file.
#[derive(Debug)]
pub struct ConfigHistoryStore {
    path: PathBuf,
    rows: Vec<ConfigRow>,
}

impl ConfigHistoryStore {
    /// Loads any existing snapshot from `state_dir/configurations.json`,
    /// or starts empty if none exists.
    pub async fn load(state_dir: impl AsRef<Path>) -> PersistResult<Self> {
        let path = state_dir.as_ref().join("configurations.json");
        let rows: Vec<ConfigRow> = match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => {
                serde_json::from_slice(&bytes).map_err(|source| PersistError::Decode {
                    path: path.clone(),
                    source,
                })?
            }
            _ => Vec::new(),
        };
        Ok(Self { path, rows })
    }

    /// Latest committed row, if any.
    pub fn latest(&self) -> Option<&ConfigRow> {
        self.rows.last()
    }

    /// Commits a new configuration, minting a fresh ETag and the next
    /// monotonic id, then snapshots the full history to disk.
    pub async fn append(&mut self, config: serde_json::Value) -> PersistResult<ConfigRow> {
        let id = self.rows.last().map(|r| r.id + 1).unwrap_or(1);
        let created_at = chrono::Utc::now();
        let etag = generate_etag(&config, id, created_at.timestamp_nanos_opt().unwrap_or(0));
        let row = ConfigRow {
            id,
            etag,
            config,
            created_at,
        };
        self.rows.push(row.clone());
        self.snapshot().await?;
        Ok(row)
    }

    async fn snapshot(&self) -> PersistResult<()> {
        let bytes = serde_json::to_vec_pretty(&self.rows).map_err(PersistError::Encode)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| PersistError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|source| PersistError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| PersistError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

/// Deterministic, opaque ETag derived from the payload, the committed row
/// id, and a nanosecond write timestamp. Mixing in `id` keeps ETags unique
/// across process restarts on the same state directory even if wall-clock
/// resolution collides, which a `(len, timestamp)`-only derivation cannot
/// guarantee.
pub fn generate_etag(config: &serde_json::Value, id: u64, timestamp_nanos: i64) -> String {
    let payload = serde_json::to_vec(config).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(payload.len().to_le_bytes());
    hasher.update(id.to_le_bytes());
    hasher.update(timestamp_nanos.to_le_bytes());
    hex::encode(hasher.finalize())
}
