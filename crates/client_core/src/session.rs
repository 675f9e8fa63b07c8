//! Session context shared by every controller.
//!
//! Reads are synchronous and cheap; writes go through [`crate::auth`], which is
//! the only module allowed to establish or clear a session.

use std::{
    io::ErrorKind,
    path::PathBuf,
    sync::{Arc, Mutex, RwLock},
};

use async_trait::async_trait;
use serde_json::{Map, Value};
use shared::domain::{Session, StoredUser, CREDENTIAL_STORAGE_KEY, USER_STORAGE_KEY};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionStorageError {
    #[error("session storage io failure at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("session storage is corrupt: {0}")]
    Corrupt(String),
    #[error("session storage unavailable: {0}")]
    Unavailable(String),
}

/// Raw persisted values, keyed the same way the backend-facing client always
/// stored them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedSession {
    pub credential: Option<String>,
    pub user: Option<StoredUser>,
}

impl PersistedSession {
    /// Credential presence alone decides authentication.
    pub fn into_session(self) -> Option<Session> {
        let credential = self.credential.filter(|c| !c.is_empty())?;
        let identity = self.user.map(|user| user.email).unwrap_or_default();
        Some(Session::new(identity, credential))
    }
}

impl From<&Session> for PersistedSession {
    fn from(session: &Session) -> Self {
        Self {
            credential: Some(session.credential.clone()),
            user: Some(StoredUser::from(session)),
        }
    }
}

#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn load(&self) -> Result<PersistedSession, SessionStorageError>;
    async fn save(&self, session: &PersistedSession) -> Result<(), SessionStorageError>;
    async fn clear(&self) -> Result<(), SessionStorageError>;
}

#[derive(Default)]
pub struct MemorySessionStorage {
    stored: Mutex<PersistedSession>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: &Session) -> Self {
        Self {
            stored: Mutex::new(PersistedSession::from(session)),
        }
    }

    pub fn snapshot(&self) -> PersistedSession {
        self.stored
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl SessionStorage for MemorySessionStorage {
    async fn load(&self) -> Result<PersistedSession, SessionStorageError> {
        Ok(self.snapshot())
    }

    async fn save(&self, session: &PersistedSession) -> Result<(), SessionStorageError> {
        *self
            .stored
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = session.clone();
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionStorageError> {
        *self
            .stored
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = PersistedSession::default();
        Ok(())
    }
}

/// JSON file holding the two fixed keys side by side.
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> SessionStorageError {
        SessionStorageError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl SessionStorage for FileSessionStorage {
    async fn load(&self) -> Result<PersistedSession, SessionStorageError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(PersistedSession::default())
            }
            Err(err) => return Err(self.io_error(err)),
        };

        let map: Map<String, Value> = serde_json::from_str(&raw)
            .map_err(|err| SessionStorageError::Corrupt(err.to_string()))?;
        let credential = map
            .get(CREDENTIAL_STORAGE_KEY)
            .and_then(Value::as_str)
            .map(str::to_string);
        let user = match map.get(USER_STORAGE_KEY) {
            Some(Value::Null) | None => None,
            Some(value) => Some(
                serde_json::from_value::<StoredUser>(value.clone())
                    .map_err(|err| SessionStorageError::Corrupt(err.to_string()))?,
            ),
        };
        Ok(PersistedSession { credential, user })
    }

    async fn save(&self, session: &PersistedSession) -> Result<(), SessionStorageError> {
        let mut map = Map::new();
        if let Some(credential) = &session.credential {
            map.insert(
                CREDENTIAL_STORAGE_KEY.to_string(),
                Value::String(credential.clone()),
            );
        }
        if let Some(user) = &session.user {
            let user = serde_json::to_value(user)
                .map_err(|err| SessionStorageError::Corrupt(err.to_string()))?;
            map.insert(USER_STORAGE_KEY.to_string(), user);
        }
        let raw = serde_json::to_string_pretty(&Value::Object(map))
            .map_err(|err| SessionStorageError::Corrupt(err.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| self.io_error(err))?;
        }
        tokio::fs::write(&self.path, raw)
            .await
            .map_err(|err| self.io_error(err))
    }

    async fn clear(&self) -> Result<(), SessionStorageError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_error(err)),
        }
    }
}

/// Explicitly passed replacement for browser-wide session state.
#[derive(Clone)]
pub struct SessionContext {
    current: Arc<RwLock<Option<Session>>>,
    storage: Arc<dyn SessionStorage>,
}

impl SessionContext {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            current: Arc::new(RwLock::new(None)),
            storage,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionStorage::new()))
    }

    /// Loads whatever the storage backend holds.
    pub async fn restore(storage: Arc<dyn SessionStorage>) -> Result<Self, SessionStorageError> {
        let persisted = storage.load().await?;
        let context = Self::new(storage);
        if let Some(session) = persisted.into_session() {
            tracing::debug!(identity = %session.identity, "restored persisted session");
            *context.write_guard() = Some(session);
        }
        Ok(context)
    }

    pub fn current(&self) -> Option<Session> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn credential(&self) -> Option<String> {
        self.current().map(|session| session.credential)
    }

    pub fn identity(&self) -> Option<String> {
        self.current().map(|session| session.identity)
    }

    pub fn is_authenticated(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    /// Persists first so a storage failure leaves the context untouched.
    pub(crate) async fn establish(&self, session: Session) -> Result<(), SessionStorageError> {
        self.storage
            .save(&PersistedSession::from(&session))
            .await?;
        *self.write_guard() = Some(session);
        Ok(())
    }

    /// The in-memory session is gone even when storage cleanup fails.
    pub(crate) async fn clear(&self) -> Result<(), SessionStorageError> {
        self.write_guard().take();
        self.storage.clear().await
    }

    fn write_guard(&self) -> std::sync::RwLockWriteGuard<'_, Option<Session>> {
        self.current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
