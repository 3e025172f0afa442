//! Channel identity resolution.
//!
//! Signed-in participants get a fresh channel per client instance
//! (`user-{id}-{nonce}`). Guests get one channel that survives restarts
//! (`guest-{nonce}`), keyed by a nonce kept in a [`NonceStore`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use handoff_core::ids::new_nonce;
use handoff_core::{ChannelId, Participant};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::errors::CoordinatorError;

/// Store key of the persisted guest nonce.
pub const GUEST_NONCE_KEY: &str = "guest";

/// Key-value storage for nonces.
pub trait NonceStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Result<Option<String>, CoordinatorError>;
    /// Write a value.
    fn set(&self, key: &str, value: &str) -> Result<(), CoordinatorError>;
    /// Delete a value. Missing keys are ignored.
    fn remove(&self, key: &str) -> Result<(), CoordinatorError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory
// ─────────────────────────────────────────────────────────────────────────────

/// Process-local [`NonceStore`].
#[derive(Debug, Default)]
pub struct MemoryNonceStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryNonceStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl NonceStore for MemoryNonceStore {
    fn get(&self, key: &str) -> Result<Option<String>, CoordinatorError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CoordinatorError> {
        let _ = self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CoordinatorError> {
        let _ = self.values.lock().remove(key);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File
// ─────────────────────────────────────────────────────────────────────────────

/// [`NonceStore`] backed by a JSON object on disk.
///
/// The whole map is rewritten on every change: written to a sibling temp
/// file, then renamed over the original.
#[derive(Debug)]
pub struct FileNonceStore {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl FileNonceStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CoordinatorError> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => HashMap::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                CoordinatorError::Storage(format!("{}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(storage_error(&path, &e)),
        };
        debug!(path = %path.display(), entries = values.len(), "nonce store opened");
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &HashMap<String, String>) -> Result<(), CoordinatorError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| storage_error(parent, &e))?;
        }
        let encoded = serde_json::to_string_pretty(values)
            .map_err(|e| CoordinatorError::Storage(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, encoded).map_err(|e| storage_error(&tmp, &e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| storage_error(&self.path, &e))
    }
}

impl NonceStore for FileNonceStore {
    fn get(&self, key: &str) -> Result<Option<String>, CoordinatorError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CoordinatorError> {
        let mut values = self.values.lock();
        let mut staged = values.clone();
        let _ = staged.insert(key.to_string(), value.to_string());
        self.persist(&staged)?;
        *values = staged;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CoordinatorError> {
        let mut values = self.values.lock();
        if !values.contains_key(key) {
            return Ok(());
        }
        let mut staged = values.clone();
        let _ = staged.remove(key);
        self.persist(&staged)?;
        *values = staged;
        Ok(())
    }
}

fn storage_error(path: &Path, e: &std::io::Error) -> CoordinatorError {
    CoordinatorError::Storage(format!("{}: {e}", path.display()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolver
// ─────────────────────────────────────────────────────────────────────────────

/// Maps a participant (or a guest) to a [`ChannelId`].
pub struct ChannelResolver {
    store: Arc<dyn NonceStore>,
    instance_nonce: String,
    guest_lock: Mutex<()>,
}

impl ChannelResolver {
    /// Resolver with a fresh per-instance nonce.
    pub fn new(store: Arc<dyn NonceStore>) -> Self {
        Self::with_instance_nonce(store, new_nonce())
    }

    /// Resolver with a fixed per-instance nonce.
    pub fn with_instance_nonce(store: Arc<dyn NonceStore>, nonce: impl Into<String>) -> Self {
        Self {
            store,
            instance_nonce: nonce.into(),
            guest_lock: Mutex::new(()),
        }
    }

    /// Nonce shared by every signed-in channel of this instance.
    pub fn instance_nonce(&self) -> &str {
        &self.instance_nonce
    }

    /// Channel for `participant`, or the guest channel when absent.
    pub fn resolve(&self, participant: Option<&Participant>) -> Result<ChannelId, CoordinatorError> {
        match participant {
            Some(p) => Ok(ChannelId::for_user(&p.user_id, &self.instance_nonce)),
            None => Ok(ChannelId::for_guest(&self.guest_nonce()?)),
        }
    }

    /// Forget the guest nonce so the next guest resolve starts a new channel.
    pub fn forget_guest(&self) -> Result<(), CoordinatorError> {
        let _guard = self.guest_lock.lock();
        self.store.remove(GUEST_NONCE_KEY)
    }

    fn guest_nonce(&self) -> Result<String, CoordinatorError> {
        let _guard = self.guest_lock.lock();
        if let Some(nonce) = self.store.get(GUEST_NONCE_KEY)? {
            return Ok(nonce);
        }
        let nonce = new_nonce();
        self.store.set(GUEST_NONCE_KEY, &nonce)?;
        info!(%nonce, "guest nonce created");
        Ok(nonce)
    }
}

impl std::fmt::Debug for ChannelResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelResolver")
            .field("instance_nonce", &self.instance_nonce)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn participant_channel_uses_instance_nonce() {
        let r = ChannelResolver::with_instance_nonce(Arc::new(MemoryNonceStore::new()), "abc");
        let id = r.resolve(Some(&Participant::new("42"))).unwrap();
        assert_eq!(id.as_str(), "user-42-abc");
    }

    #[test]
    fn separate_instances_get_separate_user_channels() {
        let store: Arc<dyn NonceStore> = Arc::new(MemoryNonceStore::new());
        let a = ChannelResolver::new(Arc::clone(&store));
        let b = ChannelResolver::new(store);
        let p = Participant::new("42");
        assert_ne!(a.resolve(Some(&p)).unwrap(), b.resolve(Some(&p)).unwrap());
    }

    #[test]
    fn guest_channel_is_stable() {
        let store: Arc<dyn NonceStore> = Arc::new(MemoryNonceStore::new());
        let a = ChannelResolver::new(Arc::clone(&store));
        let b = ChannelResolver::new(store);
        let first = a.resolve(None).unwrap();
        assert!(first.is_guest());
        assert_eq!(first, a.resolve(None).unwrap());
        assert_eq!(first, b.resolve(None).unwrap());
    }

    #[test]
    fn forget_guest_starts_new_channel() {
        let r = ChannelResolver::new(Arc::new(MemoryNonceStore::new()));
        let first = r.resolve(None).unwrap();
        r.forget_guest().unwrap();
        assert_ne!(first, r.resolve(None).unwrap());
    }

    #[test]
    fn file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("nonces.json");

        let first = {
            let store = Arc::new(FileNonceStore::open(&path).unwrap());
            ChannelResolver::new(store).resolve(None).unwrap()
        };
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let store = Arc::new(FileNonceStore::open(&path).unwrap());
        assert_eq!(ChannelResolver::new(store).resolve(None).unwrap(), first);
    }

    #[test]
    fn file_store_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonces.json");
        let store = FileNonceStore::open(&path).unwrap();
        store.set("k", "v").unwrap();
        store.remove("k").unwrap();
        store.remove("missing").unwrap();
        assert_eq!(FileNonceStore::open(&path).unwrap().get("k").unwrap(), None);
    }

    #[test]
    fn failed_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonces.json");
        let store = FileNonceStore::open(&path).unwrap();
        store.set("kept", "1").unwrap();

        // A directory where the temp file goes makes every write fail.
        std::fs::create_dir(path.with_extension("json.tmp")).unwrap();
        assert_matches!(store.set(GUEST_NONCE_KEY, "n"), Err(CoordinatorError::Storage(_)));
        assert_eq!(store.get(GUEST_NONCE_KEY).unwrap(), None);
        assert_matches!(store.remove("kept"), Err(CoordinatorError::Storage(_)));
        assert_eq!(store.get("kept").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonces.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_matches!(FileNonceStore::open(&path), Err(CoordinatorError::Storage(_)));
    }

    #[test]
    fn file_store_empty_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonces.json");
        std::fs::write(&path, "").unwrap();
        assert_eq!(FileNonceStore::open(&path).unwrap().get("guest").unwrap(), None);
    }
}
