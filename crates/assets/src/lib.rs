//! Asset storage.
//!
//! Binary payloads are moved out of messages and tool outputs into an
//! `AssetStore` and referenced by `asset://<id>` URIs. Ids are the
//! lowercase-hex SHA-256 of the content, so identical bytes share one
//! asset and re-saving is idempotent.

pub mod data_url;
pub mod resolver;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use cz_domain::asset::Asset;
use cz_domain::error::{Error, Result};

pub use resolver::{normalize_content, normalize_tool_output, CreatedAsset, NormalizedContent};

/// Save/get are concurrent-safe by contract; implementations are shared
/// across workers behind an `Arc`.
#[async_trait::async_trait]
pub trait AssetStore: Send + Sync {
    /// Persist bytes, returning the asset metadata. Saving the same bytes
    /// twice returns the same id.
    async fn save(&self, bytes: &[u8], mime_type: &str) -> Result<Asset>;

    /// Fetch an asset's metadata and bytes by id.
    async fn get(&self, id: &str) -> Result<(Asset, Vec<u8>)>;
}

/// Content-addressed id: lowercase-hex SHA-256.
pub fn asset_id(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Memory-backed store for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryAssetStore {
    inner: RwLock<HashMap<String, (Asset, Vec<u8>)>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<dyn AssetStore> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[async_trait::async_trait]
impl AssetStore for MemoryAssetStore {
    async fn save(&self, bytes: &[u8], mime_type: &str) -> Result<Asset> {
        let id = asset_id(bytes);
        let mut inner = self.inner.write();
        if let Some((asset, _)) = inner.get(&id) {
            return Ok(asset.clone());
        }
        let asset = Asset {
            id: id.clone(),
            mime_type: mime_type.to_owned(),
            byte_len: bytes.len() as u64,
            created_at: Utc::now(),
        };
        inner.insert(id, (asset.clone(), bytes.to_vec()));
        Ok(asset)
    }

    async fn get(&self, id: &str) -> Result<(Asset, Vec<u8>)> {
        self.inner
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Storage(format!("unknown asset id {id}")))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Filesystem store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Directory-backed store: bytes under `<id>`, metadata under
/// `<id>.meta.json`.
pub struct FsAssetStore {
    dir: PathBuf,
}

impl FsAssetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;
        Ok(Self { dir })
    }

    fn bytes_path(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.meta.json"))
    }
}

#[async_trait::async_trait]
impl AssetStore for FsAssetStore {
    async fn save(&self, bytes: &[u8], mime_type: &str) -> Result<Asset> {
        let id = asset_id(bytes);
        let meta_path = self.meta_path(&id);

        if let Ok(raw) = tokio::fs::read_to_string(&meta_path).await {
            if let Ok(asset) = serde_json::from_str::<Asset>(&raw) {
                return Ok(asset);
            }
        }

        let asset = Asset {
            id: id.clone(),
            mime_type: mime_type.to_owned(),
            byte_len: bytes.len() as u64,
            created_at: Utc::now(),
        };

        tokio::fs::write(self.bytes_path(&id), bytes)
            .await
            .map_err(Error::Io)?;
        let meta = serde_json::to_string(&asset)
            .map_err(|e| Error::Storage(format!("serializing asset meta: {e}")))?;
        tokio::fs::write(&meta_path, meta).await.map_err(Error::Io)?;

        tracing::debug!(asset_id = %id, mime_type, bytes = bytes.len(), "asset saved");
        Ok(asset)
    }

    async fn get(&self, id: &str) -> Result<(Asset, Vec<u8>)> {
        let raw = tokio::fs::read_to_string(self.meta_path(id))
            .await
            .map_err(|_| Error::Storage(format!("unknown asset id {id}")))?;
        let asset: Asset = serde_json::from_str(&raw)
            .map_err(|e| Error::Storage(format!("malformed asset meta for {id}: {e}")))?;
        let bytes = tokio::fs::read(self.bytes_path(id))
            .await
            .map_err(Error::Io)?;
        Ok((asset, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_dedupes_by_content() {
        let store = MemoryAssetStore::new();
        let a = store.save(b"same bytes", "image/png").await.unwrap();
        let b = store.save(b"same bytes", "image/png").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn fs_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAssetStore::new(dir.path()).unwrap();
        let asset = store.save(b"\x89PNG...", "image/png").await.unwrap();

        let (meta, bytes) = store.get(&asset.id).await.unwrap();
        assert_eq!(meta.mime_type, "image/png");
        assert_eq!(bytes, b"\x89PNG...");
    }

    #[tokio::test]
    async fn unknown_asset_is_a_storage_error() {
        let store = MemoryAssetStore::new();
        assert!(matches!(
            store.get("missing").await,
            Err(Error::Storage(_))
        ));
    }
}
