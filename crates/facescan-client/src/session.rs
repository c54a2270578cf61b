//! Session (bearer token) storage.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session file I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("session file is malformed: {0}")]
    Format(#[from] serde_json::Error),
}

/// Saved login state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub email: String,
}

/// Supplies the bearer token attached to every authenticated call.
pub trait SessionStore: Send + Sync {
    fn credentials(&self) -> Option<Credentials>;

    fn save(&self, credentials: Credentials) -> Result<(), SessionError>;

    fn clear(&self) -> Result<(), SessionError>;

    fn token(&self) -> Option<String> {
        self.credentials().map(|c| c.access_token)
    }

    fn email(&self) -> Option<String> {
        self.credentials().map(|c| c.email)
    }

    /// Invoked on a 401 from an authenticated call.
    fn on_unauthorized(&self) {
        tracing::info!("session rejected by server; clearing");
        if let Err(e) = self.clear() {
            tracing::warn!(error = %e, "failed to clear session");
        }
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// In-process session, gone when the process exits.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: RwLock<Option<Credentials>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(token: &str, email: &str) -> Self {
        Self {
            inner: RwLock::new(Some(Credentials {
                access_token: token.to_string(),
                email: email.to_string(),
            })),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn credentials(&self) -> Option<Credentials> {
        read_lock(&self.inner).clone()
    }

    fn save(&self, credentials: Credentials) -> Result<(), SessionError> {
        *write_lock(&self.inner) = Some(credentials);
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        *write_lock(&self.inner) = None;
        Ok(())
    }
}

/// Session persisted as a JSON file, readable only by the owner.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    cached: RwLock<Option<Credentials>>,
}

impl FileSessionStore {
    /// Open the store, loading any saved credentials. A missing file means
    /// logged out; so does a malformed one, which is removed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let path = path.into();
        let cached = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Credentials>(&bytes) {
                Ok(credentials) => Some(credentials),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "discarding malformed session file");
                    remove_if_present(&path)?;
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            cached: RwLock::new(cached),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(&self, credentials: &Credentials) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(credentials)?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;
        // The open mode only applies on creation.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        std::io::Write::write_all(&mut file, &json)?;
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> Result<(), SessionError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl SessionStore for FileSessionStore {
    fn credentials(&self) -> Option<Credentials> {
        read_lock(&self.cached).clone()
    }

    fn save(&self, credentials: Credentials) -> Result<(), SessionError> {
        self.write_file(&credentials)?;
        tracing::debug!(path = %self.path.display(), "session saved");
        *write_lock(&self.cached) = Some(credentials);
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        *write_lock(&self.cached) = None;
        remove_if_present(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            access_token: "tok".into(),
            email: "ann@example.com".into(),
        }
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemorySessionStore::new();
        assert!(store.token().is_none());
        store.save(creds()).unwrap();
        assert_eq!(store.token().as_deref(), Some("tok"));
        store.on_unauthorized();
        assert!(store.token().is_none());
    }

    #[test]
    fn test_file_store_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = FileSessionStore::open(&path).unwrap();
        assert!(store.credentials().is_none());
        store.save(creds()).unwrap();

        let reopened = FileSessionStore::open(&path).unwrap();
        assert_eq!(reopened.credentials(), Some(creds()));
        assert_eq!(reopened.email().as_deref(), Some("ann@example.com"));
    }

    #[test]
    fn test_file_store_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileSessionStore::open(&path).unwrap();
        store.save(creds()).unwrap();

        store.clear().unwrap();
        assert!(!path.exists());
        assert!(store.token().is_none());
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_malformed_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"{truncated").unwrap();

        let store = FileSessionStore::open(&path).unwrap();
        assert!(store.credentials().is_none());
        assert!(!path.exists());

        store.save(creds()).unwrap();
        assert_eq!(FileSessionStore::open(&path).unwrap().credentials(), Some(creds()));
    }

    #[cfg(unix)]
    #[test]
    fn test_save_tightens_existing_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileSessionStore::open(&path).unwrap();
        std::fs::write(&path, b"").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        store.save(creds()).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
