use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::session::state::User;

/// Storage key for the opaque backend session token.
pub const TOKEN_KEY: &str = "auth_token";
/// Storage key for the JSON-serialized user record.
pub const USER_KEY: &str = "user";

/// Durable key-value persistence for the session.
///
/// The backing document may carry unrelated UI preferences (e.g.
/// `sidebar-collapsed`); session writes and [`clear`](SessionStore::clear)
/// must leave those alone.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn store_token(&self, token: &str) -> Result<()>;

    async fn load_token(&self) -> Result<Option<String>>;

    async fn store_user(&self, user: &User) -> Result<()>;

    async fn load_user(&self) -> Result<Option<User>>;

    /// Remove both session keys. Other keys in the same document survive.
    async fn clear(&self) -> Result<()>;
}

/// File-backed session store: a single JSON document of key-value pairs.
pub struct FileSessionStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the backing file.
    lock: RwLock<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn read_document(&self) -> Result<Map<String, Value>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read session file {}", self.path.display())
                })
            }
        };
        serde_json::from_str(&raw)
            .with_context(|| format!("Session file {} is not valid JSON", self.path.display()))
    }

    async fn write_document(&self, document: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create session directory {}", parent.display())
            })?;
        }
        let raw = serde_json::to_string_pretty(document)?;
        tokio::fs::write(&self.path, raw).await.with_context(|| {
            format!("Failed to write session file {}", self.path.display())
        })
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.lock.write().await;
        let mut document = self.read_document().await?;
        document.insert(key.to_string(), value);
        self.write_document(&document).await
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.lock.read().await;
        Ok(self.read_document().await?.get(key).cloned())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn store_token(&self, token: &str) -> Result<()> {
        self.set(TOKEN_KEY, Value::String(token.to_string())).await?;
        debug!("Session token persisted");
        Ok(())
    }

    async fn load_token(&self) -> Result<Option<String>> {
        Ok(self
            .get(TOKEN_KEY)
            .await?
            .and_then(|value| value.as_str().map(str::to_string)))
    }

    async fn store_user(&self, user: &User) -> Result<()> {
        self.set(USER_KEY, serde_json::to_value(user)?).await?;
        debug!(user_id = %user.id, "User record persisted");
        Ok(())
    }

    async fn load_user(&self) -> Result<Option<User>> {
        match self.get(USER_KEY).await? {
            Some(value) => {
                let user = serde_json::from_value(value)
                    .context("Failed to deserialize persisted user")?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.lock.write().await;
        let mut document = self.read_document().await?;
        let had_session = document.remove(TOKEN_KEY).is_some() | document.remove(USER_KEY).is_some();
        if had_session {
            self.write_document(&document).await?;
            info!("Persisted session cleared");
        }
        Ok(())
    }
}

/// In-memory store satisfying the same contract as [`FileSessionStore`].
///
/// This is the authoritative test double for the session layer; nothing is
/// written to disk.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn store_token(&self, token: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(TOKEN_KEY.to_string(), Value::String(token.to_string()));
        Ok(())
    }

    async fn load_token(&self) -> Result<Option<String>> {
        Ok(self
            .entries
            .read()
            .await
            .get(TOKEN_KEY)
            .and_then(|value| value.as_str().map(str::to_string)))
    }

    async fn store_user(&self, user: &User) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(USER_KEY.to_string(), serde_json::to_value(user)?);
        Ok(())
    }

    async fn load_user(&self) -> Result<Option<User>> {
        match self.entries.read().await.get(USER_KEY) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(TOKEN_KEY);
        entries.remove(USER_KEY);
        Ok(())
    }
}
