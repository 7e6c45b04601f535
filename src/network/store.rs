use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::remote::RemoteNetworkId;

use super::Fingerprint;

/// File name prefix; the fingerprint is appended as `networkId_<fingerprint>`.
pub const NETWORK_ID_FILE_PREFIX: &str = "networkId";
/// Un-keyed cache file written by older plugin versions.
pub const LEGACY_NETWORK_ID_FILE: &str = "networkId";

/// Durable fingerprint → remote network id mapping, one file per fingerprint.
///
/// The store is the only writer of its directory. Reads never fail: a
/// missing, empty or unreadable file is a cache miss.
#[derive(Debug, Clone)]
pub struct NetworkIdStore {
    dir: PathBuf,
}

impl NetworkIdStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir
            .join(format!("{NETWORK_ID_FILE_PREFIX}_{fingerprint}"))
    }

    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<RemoteNetworkId> {
        let path = self.path_for(fingerprint);
        match tokio::fs::read_to_string(&path).await {
            Ok(data) => RemoteNetworkId::new(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::debug!("Ignoring unreadable network id cache {}: {}", path.display(), e);
                None
            }
        }
    }

    pub async fn put(
        &self,
        fingerprint: &Fingerprint,
        id: &RemoteNetworkId,
    ) -> Result<(), StoreError> {
        self.ensure_dir().await?;

        let path = self.path_for(fingerprint);
        let tmp = path.with_extension("tmp");
        let write = async {
            tokio::fs::write(&tmp, id.as_str()).await?;
            tokio::fs::rename(&tmp, &path).await
        };
        write.await.map_err(|source| StoreError::Write {
            path: path.display().to_string(),
            source,
        })?;

        tracing::debug!("Stored network id {} in {}", id, path.display());
        Ok(())
    }

    /// Adopt the un-keyed cache file from older versions for `fingerprint`.
    ///
    /// The legacy file is renamed to `networkId.migrated` so it is adopted
    /// at most once. Returns the adopted id.
    pub async fn migrate_legacy(&self, fingerprint: &Fingerprint) -> Option<RemoteNetworkId> {
        let legacy = self.dir.join(LEGACY_NETWORK_ID_FILE);
        let id = RemoteNetworkId::new(tokio::fs::read_to_string(&legacy).await.ok()?)?;

        if self.get(fingerprint).await.is_none() {
            if let Err(e) = self.put(fingerprint, &id).await {
                tracing::warn!("Failed to migrate legacy network id: {}", e);
                return None;
            }
            tracing::info!("Migrated legacy network id {} to {}", id, self.path_for(fingerprint).display());
        }

        let migrated = legacy.with_extension("migrated");
        if let Err(e) = tokio::fs::rename(&legacy, &migrated).await {
            tracing::warn!("Failed to rename {}: {}", legacy.display(), e);
        }
        Some(id)
    }

    /// Create the directory if absent. Concurrent creation is fine.
    async fn ensure_dir(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::CreateDir {
                path: self.dir.display().to_string(),
                source,
            })
    }
}
