// src/metrics/mod.rs — Ring-buffered metric points and counters

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::infra::config::MetricsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    TaskQuality,
    TaskCost,
    TaskLatency,
    SkillFitness,
    Errors,
    LlmCalls,
    DelegationLatency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPoint {
    pub kind: MetricKind,
    pub value: f64,
    pub labels: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate over a set of points; percentiles use linear interpolation on
/// the sorted values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricSummary {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

struct Inner {
    points: VecDeque<MetricPoint>,
    counters: HashMap<String, i64>,
}

/// Fixed-capacity metric sink. Appends are hot-path; capacity overflow drops
/// the oldest point.
pub struct MetricsCollector {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl MetricsCollector {
    pub fn new(cfg: &MetricsConfig) -> Self {
        Self {
            capacity: cfg.capacity.max(1),
            inner: Mutex::new(Inner {
                points: VecDeque::new(),
                counters: HashMap::new(),
            }),
        }
    }

    pub fn record(&self, kind: MetricKind, value: f64, labels: HashMap<String, String>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.points.len() >= self.capacity {
            inner.points.pop_front();
        }
        inner.points.push_back(MetricPoint {
            kind,
            value,
            labels,
            timestamp: Utc::now(),
        });
    }

    /// Record with a single label, the common case.
    pub fn record_labeled(&self, kind: MetricKind, value: f64, key: &str, label: &str) {
        let mut labels = HashMap::new();
        labels.insert(key.to_string(), label.to_string());
        self.record(kind, value, labels);
    }

    pub fn increment(&self, name: &str) {
        self.increment_by(name, 1);
    }

    pub fn increment_by(&self, name: &str, n: i64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *inner.counters.entry(name.to_string()).or_default() += n;
    }

    pub fn counter(&self, name: &str) -> i64 {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.counters.get(name).copied().unwrap_or(0)
    }

    /// Points of `kind` at or after `since`; `None` means all.
    pub fn query(&self, kind: MetricKind, since: Option<DateTime<Utc>>) -> Vec<MetricPoint> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .points
            .iter()
            .filter(|p| p.kind == kind && since.map(|s| p.timestamp >= s).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub fn summarize(&self, kind: MetricKind, since: Option<DateTime<Utc>>) -> MetricSummary {
        let points = self.query(kind, since);
        if points.is_empty() {
            return MetricSummary::default();
        }

        let mut values: Vec<f64> = points.iter().map(|p| p.value).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let count = values.len();
        let sum: f64 = values.iter().sum();
        MetricSummary {
            count,
            sum,
            mean: sum / count as f64,
            min: values[0],
            max: values[count - 1],
            p50: percentile(&values, 0.50),
            p95: percentile(&values, 0.95),
            p99: percentile(&values, 0.99),
        }
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Linear interpolation at `idx = p·(n−1)` over sorted values.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = p * (sorted.len() - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    let frac = idx - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}
