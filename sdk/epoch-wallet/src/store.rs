//! Persistent note storage
//!
//! Snapshots of the note tables are serialized to JSON (version 1,
//! bigints as decimal strings, byte arrays as hex) and sealed with
//! XSalsa20-Poly1305 under the wallet's viewing key:
//! `file = nonce(24) || ciphertext`.
//!
//! On-disk updates are atomic (write-temp-then-rename) and guarded by
//! an advisory directory lock (`<file>.lock`, created with mkdir).
//! A lock older than [`STALE_LOCK`] is evicted; acquisition retries
//! every 50 ms for up to 10 s before failing with `LockTimeout`.
//!
//! `load()` never raises for bad data — corruption, a wrong key, a
//! version bump, or truncation all read as "no data".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::error::{WalletError, WalletResult};
use crate::note::Note;
use crate::note_crypto::{open_bytes, seal_bytes, NONCE_LEN};

/// Current snapshot schema version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Age at which a leftover lock directory is considered abandoned
pub const STALE_LOCK: Duration = Duration::from_secs(5);

const LOCK_RETRY: Duration = Duration::from_millis(50);
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Versioned dump of the note tables
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteStoreSnapshot {
    pub version: u32,
    /// Unix seconds of the save
    pub updated_at: u64,
    pub current_epoch: u64,
    pub notes: Vec<Note>,
    pub pending_notes: Vec<Note>,
}

impl NoteStoreSnapshot {
    pub fn new(current_epoch: u64, notes: Vec<Note>, pending_notes: Vec<Note>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            updated_at: unix_now(),
            current_epoch,
            notes,
            pending_notes,
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Where snapshots live
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Returns `None` when no usable data exists; never raises for
    /// corrupt or foreign data
    async fn load(&self) -> WalletResult<Option<NoteStoreSnapshot>>;

    /// Persist a snapshot; errors propagate
    async fn save(&self, snapshot: &NoteStoreSnapshot) -> WalletResult<()>;
}

/// Volatile store for tests and ephemeral wallets.
///
/// Data is kept serialized, so later mutation of a saved snapshot
/// cannot leak into what `load` returns.
#[derive(Default)]
pub struct InMemoryStore {
    data: Mutex<Option<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NoteStore for InMemoryStore {
    async fn load(&self) -> WalletResult<Option<NoteStoreSnapshot>> {
        let data = self.data.lock().unwrap();
        match data.as_deref() {
            Some(json) => Ok(serde_json::from_str(json).ok()),
            None => Ok(None),
        }
    }

    async fn save(&self, snapshot: &NoteStoreSnapshot) -> WalletResult<()> {
        let json = serde_json::to_string(snapshot)?;
        *self.data.lock().unwrap() = Some(json);
        Ok(())
    }
}

/// Encrypted snapshot file with locked, atomic writes
pub struct EncryptedFileStore {
    path: PathBuf,
    key: [u8; 32],
}

impl EncryptedFileStore {
    /// `key` is normally the wallet's viewing key
    pub fn new(path: impl Into<PathBuf>, key: [u8; 32]) -> Self {
        Self {
            path: path.into(),
            key,
        }
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Decode a sealed snapshot, naming the precise failure
    fn open_snapshot(&self, sealed: &[u8]) -> WalletResult<NoteStoreSnapshot> {
        if sealed.len() <= NONCE_LEN {
            return Err(WalletError::StoreCorrupt);
        }

        // An AEAD tag failure under our key means the file was sealed
        // with a different one (or tampered with, which reads the same)
        let plaintext =
            open_bytes(&self.key, sealed).map_err(|_| WalletError::WrongEncryptionKey)?;

        let snapshot: NoteStoreSnapshot =
            serde_json::from_slice(&plaintext).map_err(|_| WalletError::StoreCorrupt)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(WalletError::StoreCorrupt);
        }

        Ok(snapshot)
    }
}

#[async_trait]
impl NoteStore for EncryptedFileStore {
    async fn load(&self) -> WalletResult<Option<NoteStoreSnapshot>> {
        let sealed = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "note store unreadable");
                return Ok(None);
            }
        };

        match self.open_snapshot(&sealed) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                debug!(error = %e, "note store unusable, treating as empty");
                Ok(None)
            }
        }
    }

    async fn save(&self, snapshot: &NoteStoreSnapshot) -> WalletResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let _lock = DirLock::acquire(self.lock_path()).await?;

        let plaintext = serde_json::to_vec(snapshot)?;
        let sealed = seal_bytes(&self.key, &plaintext)
            .map_err(|_| WalletError::StoreCorrupt)?;

        let temp = self.temp_path();
        tokio::fs::write(&temp, &sealed).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&temp, std::fs::Permissions::from_mode(0o600)).await?;
        }
        tokio::fs::rename(&temp, &self.path).await?;

        debug!(path = %self.path.display(), bytes = sealed.len(), "note store saved");
        Ok(())
    }
}

/// Advisory mkdir lock, released on drop
struct DirLock {
    path: PathBuf,
}

impl DirLock {
    async fn acquire(path: PathBuf) -> WalletResult<DirLock> {
        let deadline = std::time::Instant::now() + LOCK_TIMEOUT;

        loop {
            match std::fs::create_dir(&path) {
                Ok(()) => return Ok(DirLock { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if lock_is_stale(&path) {
                        warn!(path = %path.display(), "evicting stale note store lock");
                        let _ = std::fs::remove_dir(&path);
                        continue;
                    }
                }
                Err(e) => return Err(e.into()),
            }

            if std::time::Instant::now() >= deadline {
                return Err(WalletError::LockTimeout);
            }
            tokio::time::sleep(LOCK_RETRY).await;
        }
    }
}

fn lock_is_stale(path: &Path) -> bool {
    match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => modified.elapsed().map_or(false, |age| age > STALE_LOCK),
        Err(_) => false,
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::ShieldedAddress;

    fn sample_snapshot() -> NoteStoreSnapshot {
        let owner = ShieldedAddress([0x22u8; 32]);
        let mut confirmed = Note::new(1_000, [1u8; 32], owner, [2u8; 32], None).unwrap();
        confirmed.confirm(42, 3, &[9u8; 32]).unwrap();
        let pending = Note::new(500, [1u8; 32], owner, [4u8; 32], Some("p".into())).unwrap();

        NoteStoreSnapshot::new(42, vec![confirmed], vec![pending])
    }

    #[test]
    fn test_snapshot_json_roundtrip() {
        let snapshot = sample_snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: NoteStoreSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, restored);
    }

    #[tokio::test]
    async fn test_in_memory_roundtrip_and_isolation() {
        let store = InMemoryStore::new();
        assert!(store.load().await.unwrap().is_none());

        let mut snapshot = sample_snapshot();
        store.save(&snapshot).await.unwrap();

        // mutating the caller's copy must not affect stored data
        snapshot.notes[0].spent = true;
        snapshot.current_epoch = 99;

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.current_epoch, 42);
        assert!(!loaded.notes[0].spent);
        assert_eq!(loaded.notes.len(), 1);
        assert_eq!(loaded.pending_notes.len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.bin");
        let store = EncryptedFileStore::new(&path, [7u8; 32]);

        assert!(store.load().await.unwrap().is_none());

        let snapshot = sample_snapshot();
        store.save(&snapshot).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);

        // lock and temp artifacts are cleaned up
        assert!(!path.with_file_name("notes.bin.lock").exists());
        assert!(!path.with_file_name("notes.bin.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_wrong_key_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.bin");

        let store = EncryptedFileStore::new(&path, [7u8; 32]);
        store.save(&sample_snapshot()).await.unwrap();

        let wrong = EncryptedFileStore::new(&path, [8u8; 32]);
        assert!(wrong.load().await.unwrap().is_none());

        // on-disk bytes are not parseable JSON
        let raw = std::fs::read(&path).unwrap();
        assert!(serde_json::from_slice::<serde_json::Value>(&raw).is_err());
    }

    #[tokio::test]
    async fn test_file_store_corruption_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.bin");
        let store = EncryptedFileStore::new(&path, [7u8; 32]);
        store.save(&sample_snapshot()).await.unwrap();

        // flip a ciphertext byte
        let mut raw = std::fs::read(&path).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 1;
        std::fs::write(&path, &raw).unwrap();
        assert!(store.load().await.unwrap().is_none());

        // truncate below the nonce
        std::fs::write(&path, [0u8; 10]).unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[test]
    fn test_open_snapshot_names_the_failure() {
        use crate::note_crypto::seal_bytes;

        let store = EncryptedFileStore::new("unused.bin", [7u8; 32]);

        // truncation
        assert!(matches!(
            store.open_snapshot(&[0u8; 10]),
            Err(WalletError::StoreCorrupt)
        ));

        // sealed under a different key
        let json = serde_json::to_vec(&sample_snapshot()).unwrap();
        let foreign = seal_bytes(&[8u8; 32], &json).unwrap();
        assert!(matches!(
            store.open_snapshot(&foreign),
            Err(WalletError::WrongEncryptionKey)
        ));

        // right key, unparseable payload
        let garbage = seal_bytes(&[7u8; 32], b"not json").unwrap();
        assert!(matches!(
            store.open_snapshot(&garbage),
            Err(WalletError::StoreCorrupt)
        ));
    }

    #[tokio::test]
    async fn test_file_store_version_gate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.bin");
        let store = EncryptedFileStore::new(&path, [7u8; 32]);

        let mut snapshot = sample_snapshot();
        snapshot.version = 2;
        store.save(&snapshot).await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_permissions_owner_only() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("notes.bin");
            let store = EncryptedFileStore::new(&path, [7u8; 32]);
            store.save(&sample_snapshot()).await.unwrap();

            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
