use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;

use aclgate_core::error::{GatewayError, Result};

use super::{DocKey, DocumentStore};

/// In-process store. Writes can be made to fail on demand.
#[derive(Default)]
pub struct MemoryStore {
    docs: DashMap<DocKey, String>,
    fail_writes: AtomicBool,
    fail_key: Mutex<Option<DocKey>>,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every write and remove returns a persistence error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// While set, writes and removes of this one document fail.
    pub fn set_fail_key(&self, key: Option<DocKey>) {
        if let Ok(mut k) = self.fail_key.lock() {
            *k = key;
        }
    }

    /// Every stored document, keyed and sorted.
    pub fn snapshot(&self) -> BTreeMap<DocKey, String> {
        self.docs
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn get(&self, key: &DocKey) -> Option<String> {
        self.docs.get(key).map(|v| v.value().clone())
    }

    pub fn insert(&self, key: DocKey, body: impl Into<String>) {
        self.docs.insert(key, body.into());
    }

    fn check_writable(&self, key: &DocKey) -> Result<()> {
        let refused = self.fail_writes.load(Ordering::SeqCst)
            || self
                .fail_key
                .lock()
                .map(|k| k.as_ref() == Some(key))
                .unwrap_or(false);
        if refused {
            return Err(GatewayError::Persistence(format!("write refused: {key:?}")));
        }
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    fn read(&self, key: &DocKey) -> Result<Option<String>> {
        Ok(self.get(key))
    }

    fn write(&self, key: &DocKey, body: &str) -> Result<()> {
        self.check_writable(key)?;
        self.docs.insert(key.clone(), body.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, key: &DocKey) -> Result<()> {
        self.check_writable(key)?;
        self.docs.remove(key);
        Ok(())
    }

    fn list_acls(&self, app_id: &str) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .docs
            .iter()
            .filter_map(|e| match e.key() {
                DocKey::Acl { app_id: a, acl_id } if a == app_id => Some(acl_id.clone()),
                _ => None,
            })
            .collect();
        ids.sort();
        Ok(ids)
    }
}
