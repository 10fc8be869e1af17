// src/patterns/mod.rs — Fingerprint tracking and automation signals

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::store::{Store, StoreEntry};

/// One observed task shape. `skill_id` stays empty until a code skill is
/// promoted for this fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternEntry {
    pub fingerprint: String,
    pub sample_goal: String,
    pub count: u64,
    pub avg_quality: f64,
    pub skill_id: String,
}

/// Counts repeated task shapes so the pipeline can promote frequent LLM
/// work into cheaper deterministic skills.
pub struct PatternTracker {
    auto_threshold: u64,
    entries: Mutex<HashMap<String, PatternEntry>>,
    store: Option<Arc<dyn Store>>,
}

impl PatternTracker {
    pub fn new(auto_threshold: u64) -> Self {
        Self {
            auto_threshold,
            entries: Mutex::new(HashMap::new()),
            store: None,
        }
    }

    /// Write-through entries to a persistent store under `pattern:<fp>`.
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn auto_threshold(&self) -> u64 {
        self.auto_threshold
    }

    /// Stable fingerprint over the normalized goal text plus source channel.
    /// First 16 hex chars of SHA-256, collision-resistant at the scale of a
    /// single agent's corpus.
    pub fn compute_fingerprint(goal: &str, channel: &str) -> String {
        let normalized = normalize_goal(goal);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hasher.update(b"|");
        hasher.update(channel.as_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..8])
    }

    /// Increment the count and fold `quality` into the running average,
    /// then persist best-effort. Returns the updated entry.
    pub async fn record(&self, fingerprint: &str, sample_goal: &str, quality: f64) -> PatternEntry {
        let entry = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            let entry = entries
                .entry(fingerprint.to_string())
                .or_insert_with(|| PatternEntry {
                    fingerprint: fingerprint.to_string(),
                    sample_goal: sample_goal.to_string(),
                    count: 0,
                    avg_quality: 0.0,
                    skill_id: String::new(),
                });
            let n = entry.count as f64;
            entry.avg_quality = (entry.avg_quality * n + quality) / (n + 1.0);
            entry.count += 1;
            entry.clone()
        };

        if let Some(store) = &self.store {
            let key = format!("pattern:{fingerprint}");
            match serde_json::to_vec(&entry) {
                Ok(bytes) => {
                    if let Err(e) = store.put(StoreEntry::new(&key, bytes)).await {
                        tracing::warn!("pattern persist failed for {}: {}", fingerprint, e);
                    }
                }
                Err(e) => tracing::warn!("pattern serialize failed: {}", e),
            }
        }

        entry
    }

    /// Link a promoted skill back to its pattern.
    pub fn mark_promoted(&self, fingerprint: &str, skill_id: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get_mut(fingerprint) {
            entry.skill_id = skill_id.to_string();
        }
    }

    pub fn get(&self, fingerprint: &str) -> Option<PatternEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(fingerprint).cloned()
    }

    pub fn list(&self) -> Vec<PatternEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.values().cloned().collect()
    }

    /// The automation signal: seen often enough, and no skill promoted yet.
    pub fn automatable(&self, fingerprint: &str) -> bool {
        self.get(fingerprint)
            .map(|e| e.count >= self.auto_threshold && e.skill_id.is_empty())
            .unwrap_or(false)
    }
}

/// Lowercase, collapse whitespace, strip punctuation. Keeps fingerprints
/// stable across trivial rephrasings of the same goal.
fn normalize_goal(goal: &str) -> String {
    goal.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    // ─── Fingerprints ───────────────────────────────────────────

    #[test]
    fn test_fingerprint_deterministic() {
        let a = PatternTracker::compute_fingerprint("Generate unit tests for module X", "cli");
        let b = PatternTracker::compute_fingerprint("Generate unit tests for module X", "cli");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_normalizes_case_and_spacing() {
        let a = PatternTracker::compute_fingerprint("Generate  unit tests!", "cli");
        let b = PatternTracker::compute_fingerprint("generate unit tests", "cli");
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_varies_by_channel_and_goal() {
        let a = PatternTracker::compute_fingerprint("summarize the news", "cli");
        let b = PatternTracker::compute_fingerprint("summarize the news", "slack");
        let c = PatternTracker::compute_fingerprint("summarize the weather", "cli");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_normalize_goal() {
        assert_eq!(normalize_goal("  Hello,   WORLD! "), "hello world");
        assert_eq!(normalize_goal("a-b_c"), "a b c");
    }

    // ─── Recording ──────────────────────────────────────────────

    #[tokio::test]
    async fn test_record_counts_and_averages() {
        let tracker = PatternTracker::new(3);
        let fp = PatternTracker::compute_fingerprint("do the thing", "cli");

        let e = tracker.record(&fp, "do the thing", 0.8).await;
        assert_eq!(e.count, 1);
        assert!((e.avg_quality - 0.8).abs() < 1e-9);

        let e = tracker.record(&fp, "do the thing", 0.4).await;
        assert_eq!(e.count, 2);
        assert!((e.avg_quality - 0.6).abs() < 1e-9);
        assert_eq!(e.sample_goal, "do the thing");
    }

    #[tokio::test]
    async fn test_automatable_threshold_and_promotion() {
        let tracker = PatternTracker::new(3);
        let fp = "abcd1234abcd1234";

        tracker.record(fp, "goal", 0.9).await;
        tracker.record(fp, "goal", 0.9).await;
        assert!(!tracker.automatable(fp));

        tracker.record(fp, "goal", 0.9).await;
        assert!(tracker.automatable(fp));

        tracker.mark_promoted(fp, "skill-1");
        assert!(!tracker.automatable(fp));
        assert_eq!(tracker.get(fp).unwrap().skill_id, "skill-1");
    }

    #[tokio::test]
    async fn test_unknown_fingerprint_not_automatable() {
        let tracker = PatternTracker::new(1);
        assert!(!tracker.automatable("missing"));
        assert!(tracker.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_store_write_through() {
        use crate::store::MemoryStore;

        let store = Arc::new(MemoryStore::new());
        let tracker = PatternTracker::new(3).with_store(store.clone());
        let fp = "feedbeeffeedbeef";
        tracker.record(fp, "goal", 0.5).await;

        let stored = store.get(&format!("pattern:{fp}")).await.unwrap().unwrap();
        let entry: PatternEntry = serde_json::from_slice(&stored.value).unwrap();
        assert_eq!(entry.count, 1);
    }
}
