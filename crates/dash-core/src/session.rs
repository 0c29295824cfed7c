//! Explicit session context.
//!
//! The auth token lives in a [`SessionContext`] handed to whatever needs it
//! (the HTTP transport, the CLI). Persistence goes through a
//! [`SessionStore`]; there is no process-wide session.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// An authenticated console session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            username: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// Persistence for sessions.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<Session>, CoreError>;
    fn save(&self, session: &Session) -> Result<(), CoreError>;
    fn clear(&self) -> Result<(), CoreError>;
}

/// Session persisted as a JSON file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<Session>, CoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CoreError::io("read", &self.path, err)),
        };
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| CoreError::SessionDecode {
                path: self.path.clone(),
                source,
            })
    }

    fn save(&self, session: &Session) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|err| CoreError::io("create", parent, err))?;
            }
        }
        let body = serde_json::to_string_pretty(session).map_err(CoreError::SessionEncode)?;
        std::fs::write(&self.path, body).map_err(|err| CoreError::io("write", &self.path, err))
    }

    fn clear(&self) -> Result<(), CoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(CoreError::io("remove", &self.path, err)),
        }
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    slot: RwLock<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            slot: RwLock::new(Some(session)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<Session>, CoreError> {
        Ok(match self.slot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        })
    }

    fn save(&self, session: &Session) -> Result<(), CoreError> {
        match self.slot.write() {
            Ok(mut guard) => *guard = Some(session.clone()),
            Err(poisoned) => *poisoned.into_inner() = Some(session.clone()),
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), CoreError> {
        match self.slot.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
        Ok(())
    }
}

/// The session currently in use, backed by a store.
///
/// Cloning shares the same current session; separate contexts built from
/// separate stores are fully independent.
#[derive(Clone)]
pub struct SessionContext {
    store: Arc<dyn SessionStore>,
    current: Arc<RwLock<Option<Session>>>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

impl SessionContext {
    /// Create a context and load whatever the store currently holds.
    pub fn open(store: Arc<dyn SessionStore>) -> Result<Self, CoreError> {
        let current = store.load()?;
        Ok(Self {
            store,
            current: Arc::new(RwLock::new(current)),
        })
    }

    /// A context with no persistence, holding the given session.
    pub fn ephemeral(session: Option<Session>) -> Self {
        let store = match &session {
            Some(session) => MemorySessionStore::with_session(session.clone()),
            None => MemorySessionStore::new(),
        };
        Self {
            store: Arc::new(store),
            current: Arc::new(RwLock::new(session)),
        }
    }

    pub fn session(&self) -> Option<Session> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.session().map(|session| session.token)
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some_and(|token| !token.is_empty())
    }

    /// Reload from the store, replacing the current session.
    pub fn load(&self) -> Result<Option<Session>, CoreError> {
        let loaded = self.store.load()?;
        self.replace(loaded.clone());
        Ok(loaded)
    }

    /// Persist and activate a session.
    pub fn save(&self, session: Session) -> Result<(), CoreError> {
        self.store.save(&session)?;
        self.replace(Some(session));
        Ok(())
    }

    /// Forget the session both in memory and in the store.
    pub fn clear(&self) -> Result<(), CoreError> {
        self.store.clear()?;
        self.replace(None);
        Ok(())
    }

    fn replace(&self, session: Option<Session>) {
        match self.current.write() {
            Ok(mut guard) => *guard = session,
            Err(poisoned) => *poisoned.into_inner() = session,
        }
    }
}
