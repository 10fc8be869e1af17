// src/security/audit.rs — Append-only audit trail

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{Store, StoreEntry};

const DEFAULT_QUERY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    InputBlocked,
    InjectionWarning,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    SkillExecuted,
    SkillFallback,
    DelegationStarted,
    DelegationCompleted,
    BudgetRejected,
    Rollback,
    PolicyViolation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: AuditKind,
    pub severity: AuditSeverity,
    pub agent_id: String,
    pub actor: String,
    pub action: String,
    pub resource: String,
    pub details: Vec<String>,
    pub success: bool,
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(kind: AuditKind, severity: AuditSeverity, action: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            severity,
            agent_id: String::new(),
            actor: String::new(),
            action: action.into(),
            resource: String::new(),
            details: Vec::new(),
            success: true,
            error: None,
        }
    }

    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Filter for reading back events. All fields are optional conjuncts.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub kind: Option<AuditKind>,
    pub severity: Option<AuditSeverity>,
    pub agent_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Append-only event store. Appends are best-effort and never propagate
/// errors to callers; persistence failures are logged and dropped.
pub struct AuditLog {
    events: Mutex<Vec<AuditEvent>>,
    store: Option<Arc<dyn Store>>,
    seq: AtomicU64,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            store: None,
            seq: AtomicU64::new(0),
        }
    }

    /// Write-through events to a persistent store under `audit:<ts>_<seq>`.
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn append(&self, event: AuditEvent) {
        {
            let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
            events.push(event.clone());
        }

        if let Some(store) = &self.store {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed);
            let key = format!("audit:{}_{}", event.timestamp.timestamp_nanos_opt().unwrap_or(0), seq);
            let store = store.clone();
            let actor = event.actor.clone();
            let action = event.action.clone();
            match serde_json::to_vec(&event) {
                Ok(bytes) => {
                    // Fire-and-forget: audit writes must not block the
                    // pipeline, and a missing runtime must not panic it.
                    match tokio::runtime::Handle::try_current() {
                        Ok(handle) => {
                            handle.spawn(async move {
                                let entry = StoreEntry::new(&key, bytes)
                                    .meta("actor", &actor)
                                    .meta("action", &action);
                                if let Err(e) = store.put(entry).await {
                                    tracing::warn!("audit persist failed: {}", e);
                                }
                            });
                        }
                        Err(_) => {
                            tracing::warn!("audit persist skipped: no async runtime")
                        }
                    }
                }
                Err(e) => tracing::warn!("audit serialize failed: {}", e),
            }
        }
    }

    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEvent> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let limit = query.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
        events
            .iter()
            .filter(|e| {
                query.kind.map(|k| e.kind == k).unwrap_or(true)
                    && query.severity.map(|s| e.severity == s).unwrap_or(true)
                    && query
                        .agent_id
                        .as_ref()
                        .map(|a| &e.agent_id == a)
                        .unwrap_or(true)
                    && query.since.map(|s| e.timestamp >= s).unwrap_or(true)
                    && query.until.map(|u| e.timestamp <= u).unwrap_or(true)
            })
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
