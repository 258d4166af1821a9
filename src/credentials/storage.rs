//! Credential persistence backends.
//!
//! The node never talks to a backend directly; it goes through
//! [`TokenStore`](super::TokenStore), which adds per-node locking and record
//! versioning on top of whichever [`CredentialStore`] the host provides.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

use super::{CredentialRecord, StoredCredentials};
use crate::errors::{NodeError, NodeResult};

/// Secret persistence for credential records, addressed by node identity.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Loads the record for a node, if one exists.
    async fn load(&self, node_id: &str) -> NodeResult<Option<CredentialRecord>>;

    /// Persists the record for a node, replacing any previous one.
    async fn save(&self, node_id: &str, record: &CredentialRecord) -> NodeResult<()>;

    /// Returns true if a record exists for the node.
    async fn exists(&self, node_id: &str) -> NodeResult<bool> {
        Ok(self.load(node_id).await?.is_some())
    }
}

/// In-memory credential store.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    records: RwLock<HashMap<String, StoredCredentials>>,
}

impl InMemoryCredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns true if nothing has been stored.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn load(&self, node_id: &str) -> NodeResult<Option<CredentialRecord>> {
        let records = self.records.read().await;
        Ok(records.get(node_id).cloned().map(CredentialRecord::from))
    }

    async fn save(&self, node_id: &str, record: &CredentialRecord) -> NodeResult<()> {
        self.records
            .write()
            .await
            .insert(node_id.to_string(), record.to_stored());
        Ok(())
    }
}

/// Credential store keeping one JSON file per node inside a directory.
///
/// File names are derived from a hash of the node identity so arbitrary ids
/// never escape the directory. Writes go to a temporary file first and are
/// moved into place with a rename.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    /// Opens (and creates, if needed) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> NodeResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            NodeError::storage(format!(
                "Failed to create credential directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    /// Directory the store writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, node_id: &str) -> PathBuf {
        let digest = Sha256::digest(node_id.as_bytes());
        let name = hex::encode(&digest[..16]);
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self, node_id: &str) -> NodeResult<Option<CredentialRecord>> {
        let path = self.path_for(node_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(NodeError::storage(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let stored: StoredCredentials = serde_json::from_slice(&raw).map_err(|e| {
            NodeError::storage(format!("Corrupt credential file {}: {}", path.display(), e))
        })?;
        Ok(Some(stored.into()))
    }

    async fn save(&self, node_id: &str, record: &CredentialRecord) -> NodeResult<()> {
        let path = self.path_for(node_id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(&record.to_stored())
            .map_err(|e| NodeError::storage(format!("Failed to encode credentials: {}", e)))?;

        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| NodeError::storage(format!("Failed to write {}: {}", tmp.display(), e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| {
                    NodeError::storage(format!("Failed to restrict {}: {}", tmp.display(), e))
                })?;
        }

        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| NodeError::storage(format!("Failed to replace {}: {}", path.display(), e)))?;

        debug!(node_id, path = %path.display(), "Credential record written");
        Ok(())
    }
}
