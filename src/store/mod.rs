// src/store/mod.rs — Persistent KV store port with FTS-style search

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::infra::errors::Result;

/// One stored record: value bytes plus string metadata.
#[derive(Debug, Clone, Default)]
pub struct StoreEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub metadata: HashMap<String, String>,
}

impl StoreEntry {
    pub fn new(key: &str, value: Vec<u8>) -> Self {
        Self {
            key: key.to_string(),
            value,
            metadata: HashMap::new(),
        }
    }

    pub fn meta(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Persistent key-value port with prefix listing and full-text search.
/// Concrete backends (SQLite with FTS, etc.) live outside this crate.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<StoreEntry>>;
    async fn put(&self, entry: StoreEntry) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn list(&self, prefix: &str, limit: usize) -> Result<Vec<String>>;
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<StoreEntry>>;
    async fn count(&self) -> Result<usize>;
    async fn close(&self) -> Result<()>;
}

// ─── Key layout ──────────────────────────────────────────────────

pub fn scheduler_key(id: &str) -> String {
    format!("scheduler:{id}")
}

pub fn audit_key(timestamp_nanos: i64, seq: u64) -> String {
    format!("audit:{timestamp_nanos}_{seq}")
}

pub fn credential_key(name: &str) -> String {
    format!("cred:{name}")
}

pub fn kb_key(key: &str) -> String {
    format!("kb:{key}")
}

pub fn pattern_key(fingerprint: &str) -> String {
    format!("pattern:{fingerprint}")
}

// ─── In-memory reference implementation ──────────────────────────

/// BTreeMap-backed store. Search is a case-insensitive substring scan over
/// values, enough for tests and small deployments.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, StoreEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<StoreEntry>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, entry: StoreEntry) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .take(limit)
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<StoreEntry>> {
        let needle = query.to_lowercase();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .values()
            .filter(|e| {
                String::from_utf8_lossy(&e.value)
                    .to_lowercase()
                    .contains(&needle)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.len())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
