// src/memory/mod.rs — Memory ports and in-memory reference implementations

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::infra::errors::Result;

/// One conversational turn kept in short-term memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub role: String,
    pub content: String,
    pub metadata: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

/// Durable summary or reflection kept in long-term memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongTermEntry {
    pub id: String,
    pub content: String,
    pub tags: Vec<String>,
    pub quality: f64,
    pub timestamp: DateTime<Utc>,
}

impl LongTermEntry {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            tags: Vec::new(),
            quality: 0.0,
            timestamp: Utc::now(),
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn quality(mut self, quality: f64) -> Self {
        self.quality = quality;
        self
    }
}

/// Cross-agent insight; `fitness` ranks it against other agents' entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkbEntry {
    pub id: String,
    pub content: String,
    pub fitness: f64,
    pub source_agent: String,
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait ShortTermMemory: Send + Sync {
    async fn add(
        &self,
        role: &str,
        content: &str,
        metadata: HashMap<String, String>,
    ) -> Result<()>;
    async fn get_recent(&self, n: usize) -> Result<Vec<MemoryEntry>>;
}

#[async_trait]
pub trait LongTermMemory: Send + Sync {
    async fn store(&self, entry: LongTermEntry) -> Result<()>;
    async fn get_all(&self, limit: usize) -> Result<Vec<LongTermEntry>>;
}

#[async_trait]
pub trait SharedKnowledgeBase: Send + Sync {
    async fn store(&self, entry: SkbEntry) -> Result<()>;
}

// ─── In-memory reference implementations ─────────────────────────

/// Capacity-capped rolling conversation buffer.
pub struct InMemoryShortTerm {
    capacity: usize,
    entries: Mutex<VecDeque<MemoryEntry>>,
}

impl InMemoryShortTerm {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }
}

impl Default for InMemoryShortTerm {
    fn default() -> Self {
        Self::new(100)
    }
}

#[async_trait]
impl ShortTermMemory for InMemoryShortTerm {
    async fn add(
        &self,
        role: &str,
        content: &str,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(MemoryEntry {
            id: Uuid::new_v4().to_string(),
            role: role.to_string(),
            content: content.to_string(),
            metadata,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn get_recent(&self, n: usize) -> Result<Vec<MemoryEntry>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let skip = entries.len().saturating_sub(n);
        Ok(entries.iter().skip(skip).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryLongTerm {
    entries: Mutex<Vec<LongTermEntry>>,
}

impl InMemoryLongTerm {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LongTermMemory for InMemoryLongTerm {
    async fn store(&self, entry: LongTermEntry) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(entry);
        Ok(())
    }

    async fn get_all(&self, limit: usize) -> Result<Vec<LongTermEntry>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.iter().take(limit).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemorySkb {
    entries: Mutex<Vec<SkbEntry>>,
}

impl InMemorySkb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<SkbEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clone()
    }
}

#[async_trait]
impl SharedKnowledgeBase for InMemorySkb {
    async fn store(&self, entry: SkbEntry) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(entry);
        Ok(())
    }
}
