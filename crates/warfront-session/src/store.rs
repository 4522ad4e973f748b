//! Durable client-side storage for the identity token.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use warfront_protocol::Identity;

use crate::SessionError;

/// Where a client keeps its identity between runs.
pub trait TokenStore: Send + Sync + 'static {
    /// Returns the stored identity, if any.
    fn load(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<Identity>, SessionError>> + Send;

    /// Replaces the stored identity.
    fn save(
        &self,
        identity: &Identity,
    ) -> impl std::future::Future<Output = Result<(), SessionError>> + Send;

    /// Forgets the stored identity. Clearing an empty store is not an error.
    fn clear(&self) -> impl std::future::Future<Output = Result<(), SessionError>> + Send;
}

// ---------------------------------------------------------------------------
// MemoryTokenStore
// ---------------------------------------------------------------------------

/// Keeps the identity for the lifetime of the process only.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<Identity>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `identity`, as if saved by an earlier run.
    pub fn with_identity(identity: Identity) -> Self {
        Self {
            slot: Mutex::new(Some(identity)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<Identity>, SessionError> {
        Ok(self.slot.lock().await.clone())
    }

    async fn save(&self, identity: &Identity) -> Result<(), SessionError> {
        *self.slot.lock().await = Some(identity.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionError> {
        self.slot.lock().await.take();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileTokenStore
// ---------------------------------------------------------------------------

/// Stores the identity as a JSON file.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves either the old identity or the new one.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<Identity>, SessionError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SessionError::Storage(e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(SessionError::CorruptStore)
    }

    async fn save(&self, identity: &Identity) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(SessionError::Storage)?;
            }
        }
        let bytes = serde_json::to_vec_pretty(identity).map_err(SessionError::CorruptStore)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(SessionError::Storage)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(SessionError::Storage)
    }

    async fn clear(&self) -> Result<(), SessionError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Storage(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warfront_protocol::IdentityId;

    fn identity() -> Identity {
        Identity {
            id: IdentityId(7),
            token: "0123456789abcdef0123456789abcdef".into(),
            created_at: 1_700_000_000_000,
            is_anonymous: true,
        }
    }

    #[tokio::test]
    async fn test_memory_store_save_then_load() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.load().await.unwrap(), None);

        store.save(&identity()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(identity()));

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("identity.json"));
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/identity.json");

        FileTokenStore::new(&path).save(&identity()).await.unwrap();

        // A second store on the same path sees what the first wrote,
        // like an app restart would.
        let reopened = FileTokenStore::new(&path);
        assert_eq!(reopened.load().await.unwrap(), Some(identity()));
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let result = FileTokenStore::new(&path).load().await;
        assert!(matches!(result, Err(SessionError::CorruptStore(_))));
    }

    #[tokio::test]
    async fn test_file_store_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("identity.json"));
        store.save(&identity()).await.unwrap();

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }
}
