/// Credential storage
///
/// The client reads the store on every outbound request and writes it only
/// on login, registration, a successful refresh or session teardown. All
/// operations are synchronous so they can run inside the refresh critical
/// section without holding a lock across an await.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::ApiError;
use crate::session::credentials::Credentials;

pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<Credentials>, ApiError>;
    fn save(&self, credentials: &Credentials) -> Result<(), ApiError>;
    /// Remove all credentials. Returns whether anything was stored.
    fn clear(&self) -> Result<bool, ApiError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Credentials kept for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    current: Mutex<Option<Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            current: Mutex::new(Some(credentials)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Credentials>, ApiError> {
        Ok(lock(&self.current).clone())
    }

    fn save(&self, credentials: &Credentials) -> Result<(), ApiError> {
        *lock(&self.current) = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<bool, ApiError> {
        Ok(lock(&self.current).take().is_some())
    }
}

/// Credentials persisted as JSON so a restart does not force a new login
///
/// Writes go through to disk; reads are served from memory.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    cache: Mutex<Option<Credentials>>,
}

impl FileCredentialStore {
    /// Open the store at `path`, loading credentials left by a previous run
    ///
    /// # Errors
    /// Returns `ApiError::Storage` if the file exists but cannot be read or parsed
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let path = path.as_ref().to_path_buf();
        let cached = match fs::read(&path) {
            Ok(bytes) => Some(serde_json::from_slice::<Credentials>(&bytes).map_err(|e| {
                ApiError::Storage(format!("Corrupt credentials file {}: {}", path.display(), e))
            })?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(ApiError::Storage(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        tracing::debug!(path = %path.display(), restored = cached.is_some(), "Credential store opened");

        Ok(Self {
            path,
            cache: Mutex::new(cached),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credentials>, ApiError> {
        Ok(lock(&self.cache).clone())
    }

    fn save(&self, credentials: &Credentials) -> Result<(), ApiError> {
        let mut cache = lock(&self.cache);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ApiError::Storage(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        let json = serde_json::to_vec(credentials)?;
        fs::write(&self.path, json).map_err(|e| {
            ApiError::Storage(format!("Failed to write {}: {}", self.path.display(), e))
        })?;

        *cache = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<bool, ApiError> {
        let mut cache = lock(&self.cache);
        let had_credentials = cache.take().is_some();

        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(had_credentials),
            Err(e) => Err(ApiError::Storage(format!(
                "Failed to remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}
