//! Per-chat-user session records
//!
//! The chat front end keeps the credentials a user linked and the worker name
//! they are about to deploy. Records are keyed by chat user id and follow
//! last-write-wins semantics. The deployment core never touches this store;
//! callers load a record and turn it into [`Credentials`].

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::request::Credentials;

/// Stored record for one chat user
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub api_token: String,
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_worker_name: Option<String>,
}

impl UserRecord {
    /// Validate the stored values into deploy credentials
    pub fn credentials(&self) -> Result<Credentials, DeployError> {
        Credentials::new(
            self.api_token.clone(),
            self.account_id.clone(),
            self.zone_id.clone(),
        )
    }
}

impl fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRecord")
            .field("api_token", &"[REDACTED]")
            .field("account_id", &self.account_id)
            .field("zone_id", &self.zone_id)
            .field("temp_worker_name", &self.temp_worker_name)
            .finish()
    }
}

/// Key-value store for session records
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Get the record for a user
    async fn get(&self, key: &str) -> Result<Option<UserRecord>, DeployError>;

    /// Insert or replace the record for a user
    async fn set(&self, key: &str, record: UserRecord) -> Result<(), DeployError>;

    /// Remove the record for a user, returning whether one existed
    async fn delete(&self, key: &str) -> Result<bool, DeployError>;
}

/// In-memory session store
#[derive(Default)]
pub struct MemorySessionRepository {
    records: RwLock<HashMap<String, UserRecord>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn get(&self, key: &str) -> Result<Option<UserRecord>, DeployError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, record: UserRecord) -> Result<(), DeployError> {
        self.records.write().await.insert(key.to_string(), record);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, DeployError> {
        Ok(self.records.write().await.remove(key).is_some())
    }
}

/// Session store backed by a single JSON file.
///
/// The file is read and rewritten whole on every access; the internal mutex
/// serializes access from this process. Writes are atomic and the file is
/// restricted to its owner since it holds API tokens.
pub struct JsonSessionRepository {
    file: File,
    lock: Mutex<()>,
}

impl JsonSessionRepository {
    pub fn new(file: File) -> Self {
        Self {
            file,
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<HashMap<String, UserRecord>, DeployError> {
        if !self.file.exists().await {
            return Ok(HashMap::new());
        }
        let contents = self.file.read_string().await?;
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    async fn store(&self, records: &HashMap<String, UserRecord>) -> Result<(), DeployError> {
        let contents = serde_json::to_vec_pretty(records)?;
        self.file.write_atomic(&contents).await?;
        self.file.set_permissions_600().await?;
        debug!("Saved {} session record(s) to {}", records.len(), self.file.path().display());
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for JsonSessionRepository {
    async fn get(&self, key: &str) -> Result<Option<UserRecord>, DeployError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, record: UserRecord) -> Result<(), DeployError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        records.insert(key.to_string(), record);
        self.store(&records).await
    }

    async fn delete(&self, key: &str) -> Result<bool, DeployError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let existed = records.remove(key).is_some();
        if existed {
            self.store(&records).await?;
        }
        Ok(existed)
    }
}
