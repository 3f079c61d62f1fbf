//! In-memory store implementations for testing.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use vaultx_common::{Result, Username};

use crate::records::{RecordStore, StoredRecord, TITLE_PLACEHOLDER};
use crate::remote::RemoteStore;
use crate::users::{UserProfile, UserStore};

/// In-memory local store implementing both user and record traits.
///
/// Useful for testing and development. All data is lost on drop.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<StoredRecord>>,
    next_id: AtomicI64,
    users: RwLock<Vec<Username>>,
    profiles: RwLock<HashMap<String, UserProfile>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    fn make_record(&self, username: &Username, data: &str) -> StoredRecord {
        StoredRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            username: username.as_str().to_string(),
            title: TITLE_PLACEHOLDER.to_string(),
            data: data.to_string(),
            created_at: Utc::now().timestamp(),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, username: &Username, data: &str) -> Result<StoredRecord> {
        let record = self.make_record(username, data);
        self.records.write().unwrap().push(record.clone());
        Ok(record)
    }

    async fn get(&self, username: &Username, id: i64) -> Result<Option<StoredRecord>> {
        Ok(self
            .records
            .read()
            .unwrap()
            .iter()
            .find(|r| r.id == id && r.username == username.as_str())
            .cloned())
    }

    async fn list(&self, username: &Username) -> Result<Vec<StoredRecord>> {
        Ok(self
            .records
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.username == username.as_str())
            .cloned()
            .collect())
    }

    async fn update(&self, username: &Username, id: i64, data: &str) -> Result<bool> {
        let mut records = self.records.write().unwrap();
        match records
            .iter_mut()
            .find(|r| r.id == id && r.username == username.as_str())
        {
            Some(record) => {
                record.data = data.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, username: &Username, id: i64) -> Result<bool> {
        let mut records = self.records.write().unwrap();
        let before = records.len();
        records.retain(|r| !(r.id == id && r.username == username.as_str()));
        Ok(records.len() < before)
    }

    async fn replace_all(&self, username: &Username, rows: &[String]) -> Result<usize> {
        let staged: Vec<StoredRecord> = rows.iter().map(|d| self.make_record(username, d)).collect();

        // Single write-lock scope stands in for the transaction.
        let mut records = self.records.write().unwrap();
        records.retain(|r| r.username != username.as_str());
        records.extend(staged);
        Ok(rows.len())
    }

    async fn purge_all(&self) -> Result<()> {
        self.records.write().unwrap().clear();
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn list_users(&self) -> Result<Vec<Username>> {
        Ok(self.users.read().unwrap().clone())
    }

    async fn load_profile(&self, username: &Username) -> Result<Option<UserProfile>> {
        Ok(self
            .profiles
            .read()
            .unwrap()
            .get(username.as_str())
            .cloned())
    }

    async fn save_profile(&self, username: &Username, profile: &UserProfile) -> Result<()> {
        self.profiles
            .write()
            .unwrap()
            .insert(username.as_str().to_string(), profile.clone());
        let mut users = self.users.write().unwrap();
        if !users.contains(username) {
            users.push(username.clone());
        }
        Ok(())
    }

    async fn purge_all(&self) -> Result<()> {
        self.profiles.write().unwrap().clear();
        self.users.write().unwrap().clear();
        Ok(())
    }
}

/// In-memory remote document store with field-level merge.
#[derive(Default)]
pub struct MemoryRemote {
    documents: RwLock<HashMap<String, Map<String, Value>>>,
}

impl MemoryRemote {
    /// Create a new empty remote.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch_document(&self, key: &str) -> Result<Option<Map<String, Value>>> {
        Ok(self.documents.read().unwrap().get(key).cloned())
    }

    async fn merge_field(&self, key: &str, field: &str, value: Value) -> Result<()> {
        let mut documents = self.documents.write().unwrap();
        documents
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }
}
