//! Client-side credential persistence.
//!
//! The token and the user record are stored as two independent entries of a
//! [`KeyValueStore`]. Either may be missing; a session only counts as
//! authenticated when both are present and the user entry parses.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use applink_types::UserSession;
use thiserror::Error;
use tracing::{debug, warn};

pub const TOKEN_KEY: &str = "auth_token";
pub const USER_KEY: &str = "user";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Durable string-to-string storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── In-memory ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        lock(&self.entries).insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

// ── JSON file ────────────────────────────────────────────────────────────────

/// A flat JSON object on disk, rewritten atomically on every change.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    // Serialises read-modify-write cycles within this process.
    guard: Mutex<()>,
}

impl FileKeyValueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        write_private(&tmp, &serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), entries = entries.len(), "credential file written");
        Ok(())
    }

    fn update<F>(&self, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let _guard = lock(&self.guard);
        let mut entries = self.load()?;
        if f(&mut entries) {
            self.persist(&entries)?;
        }
        Ok(())
    }
}

/// Write `bytes` to `path`, readable by the owner only on unix.
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    // `mode` only applies on creation; a leftover file keeps its old bits.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(bytes)?;
    file.sync_all()
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = lock(&self.guard);
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.insert(key.to_owned(), value.to_owned());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(|entries| entries.remove(key).is_some())
    }
}

// ── Credential store ─────────────────────────────────────────────────────────

/// Token and user record on top of any [`KeyValueStore`].
pub struct CredentialStore<K: ?Sized = dyn KeyValueStore> {
    kv: std::sync::Arc<K>,
}

impl<K: ?Sized> Clone for CredentialStore<K> {
    fn clone(&self) -> Self {
        Self {
            kv: self.kv.clone(),
        }
    }
}

impl<K: KeyValueStore + ?Sized> CredentialStore<K> {
    pub fn new(kv: std::sync::Arc<K>) -> Self {
        Self { kv }
    }

    pub fn store_token(&self, token: &str) -> Result<(), StorageError> {
        self.kv.set(TOKEN_KEY, token)
    }

    pub fn token(&self) -> Result<Option<String>, StorageError> {
        self.kv.get(TOKEN_KEY)
    }

    pub fn remove_token(&self) -> Result<(), StorageError> {
        self.kv.remove(TOKEN_KEY)
    }

    pub fn store_user(&self, user: &UserSession) -> Result<(), StorageError> {
        self.kv.set(USER_KEY, &serde_json::to_string(user)?)
    }

    /// The stored user, or `None` when absent or unreadable.
    pub fn user(&self) -> Result<Option<UserSession>, StorageError> {
        let Some(raw) = self.kv.get(USER_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                warn!(error = %e, "stored user entry is unreadable, ignoring");
                Ok(None)
            }
        }
    }

    pub fn remove_user(&self) -> Result<(), StorageError> {
        self.kv.remove(USER_KEY)
    }

    /// Persist both halves of a successful sign-in.
    pub fn store(&self, token: &str, user: &UserSession) -> Result<(), StorageError> {
        self.store_token(token)?;
        self.store_user(user)
    }

    pub fn sign_out(&self) -> Result<(), StorageError> {
        self.remove_token()?;
        self.remove_user()
    }

    pub fn is_authenticated(&self) -> Result<bool, StorageError> {
        Ok(self.token()?.is_some() && self.user()?.is_some())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use tracing_test::traced_test;

    use super::*;

    fn user() -> UserSession {
        UserSession {
            id: "u1".into(),
            email: "ada@example.com".into(),
            name: "Ada".into(),
        }
    }

    fn memory_store() -> (Arc<MemoryKeyValueStore>, CredentialStore<MemoryKeyValueStore>) {
        let kv = Arc::new(MemoryKeyValueStore::new());
        (kv.clone(), CredentialStore::new(kv))
    }

    #[test]
    fn full_credential_is_authenticated() {
        let (_, store) = memory_store();
        store.store("tok", &user()).unwrap();
        assert!(store.is_authenticated().unwrap());
        assert_eq!(store.token().unwrap().as_deref(), Some("tok"));
        assert_eq!(store.user().unwrap(), Some(user()));
    }

    #[test]
    fn partial_credential_is_not_authenticated() {
        let (_, store) = memory_store();
        store.store_token("tok").unwrap();
        assert!(!store.is_authenticated().unwrap());

        store.remove_token().unwrap();
        store.store_user(&user()).unwrap();
        assert!(!store.is_authenticated().unwrap());
    }

    #[test]
    #[traced_test]
    fn garbage_user_entry_reads_as_absent() {
        let (kv, store) = memory_store();
        store.store_token("tok").unwrap();
        kv.set(USER_KEY, "{not json").unwrap();
        assert_eq!(store.user().unwrap(), None);
        assert!(!store.is_authenticated().unwrap());
        assert!(logs_contain("stored user entry is unreadable"));
    }

    #[test]
    fn sign_out_removes_both_entries() {
        let (kv, store) = memory_store();
        store.store("tok", &user()).unwrap();
        store.sign_out().unwrap();
        assert_eq!(kv.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(kv.get(USER_KEY).unwrap(), None);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.json");

        let store = CredentialStore::new(Arc::new(FileKeyValueStore::new(&path)));
        store.store("tok", &user()).unwrap();

        let reopened = CredentialStore::new(Arc::new(FileKeyValueStore::new(&path)));
        assert!(reopened.is_authenticated().unwrap());
        assert_eq!(reopened.user().unwrap(), Some(user()));

        reopened.sign_out().unwrap();
        assert!(!store.is_authenticated().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn credential_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(path.with_extension("json.tmp"), "stale").unwrap();

        let kv = FileKeyValueStore::new(&path);
        kv.set(TOKEN_KEY, "tok").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(kv.get(TOKEN_KEY).unwrap().as_deref(), Some("tok"));
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKeyValueStore::new(dir.path().join("absent.json"));
        assert_eq!(kv.get(TOKEN_KEY).unwrap(), None);
        kv.remove(TOKEN_KEY).unwrap();
        assert!(!kv.path().exists());
    }

    #[test]
    fn dyn_store_is_usable() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let store: CredentialStore = CredentialStore::new(kv);
        assert!(!store.is_authenticated().unwrap());
    }
}
