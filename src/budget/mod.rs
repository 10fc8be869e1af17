// src/budget/mod.rs — Spend enforcement with daily/monthly rollover

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// When neither limit is set, callers still need a finite budget signal for
/// model routing; this stands in for "effectively unconstrained".
const UNLIMITED_SENTINEL: f64 = 1000.0;

/// Snapshot of accumulated spend. `daily_spend` and `monthly_spend` are
/// zeroed whenever the corresponding period key changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetState {
    pub daily_limit: f64,
    pub monthly_limit: f64,
    pub daily_spend: f64,
    pub monthly_spend: f64,
    pub total_spend: f64,
    pub task_spend: HashMap<String, f64>,
    pub day_key: String,
    pub month_key: String,
}

/// Thread-safe spend counter with two limits. A limit of 0 means unlimited.
pub struct BudgetTracker {
    state: Mutex<BudgetState>,
}

impl BudgetTracker {
    pub fn new(daily_limit: f64, monthly_limit: f64) -> Self {
        let now = Utc::now();
        Self {
            state: Mutex::new(BudgetState {
                daily_limit,
                monthly_limit,
                daily_spend: 0.0,
                monthly_spend: 0.0,
                total_spend: 0.0,
                task_spend: HashMap::new(),
                day_key: day_key(now),
                month_key: month_key(now),
            }),
        }
    }

    /// Add `cost` to the daily, monthly, total, and per-task counters,
    /// rolling the period counters over first if the day or month changed.
    pub fn record(&self, task_id: &str, cost: f64) {
        self.record_at(task_id, cost, Utc::now());
    }

    fn record_at(&self, task_id: &str, cost: f64, now: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        rollover(&mut state, now);
        state.daily_spend += cost;
        state.monthly_spend += cost;
        state.total_spend += cost;
        *state.task_spend.entry(task_id.to_string()).or_default() += cost;
    }

    /// True iff adding `amount` would keep both non-zero limits intact.
    /// Advisory: a race between check and record may overshoot slightly.
    pub fn can_spend(&self, amount: f64) -> bool {
        self.can_spend_at(amount, Utc::now())
    }

    fn can_spend_at(&self, amount: f64, now: DateTime<Utc>) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let (daily, monthly) = effective_spend(&state, now);
        let daily_ok = state.daily_limit == 0.0 || daily + amount <= state.daily_limit;
        let monthly_ok = state.monthly_limit == 0.0 || monthly + amount <= state.monthly_limit;
        daily_ok && monthly_ok
    }

    /// Remaining daily budget, or -1 when the daily limit is unlimited.
    pub fn remaining_daily(&self) -> f64 {
        self.remaining_daily_at(Utc::now())
    }

    fn remaining_daily_at(&self, now: DateTime<Utc>) -> f64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.daily_limit == 0.0 {
            return -1.0;
        }
        let (daily, _) = effective_spend(&state, now);
        (state.daily_limit - daily).max(0.0)
    }

    /// Remaining monthly budget, or -1 when the monthly limit is unlimited.
    pub fn remaining_monthly(&self) -> f64 {
        self.remaining_monthly_at(Utc::now())
    }

    fn remaining_monthly_at(&self, now: DateTime<Utc>) -> f64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.monthly_limit == 0.0 {
            return -1.0;
        }
        let (_, monthly) = effective_spend(&state, now);
        (state.monthly_limit - monthly).max(0.0)
    }

    /// True when daily or monthly spend has reached 80% of its limit. The
    /// router uses this to prefer cheaper tiers before hard exhaustion.
    pub fn should_downgrade(&self) -> bool {
        self.should_downgrade_at(Utc::now())
    }

    fn should_downgrade_at(&self, now: DateTime<Utc>) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let (daily, monthly) = effective_spend(&state, now);
        (state.daily_limit > 0.0 && daily / state.daily_limit >= 0.8)
            || (state.monthly_limit > 0.0 && monthly / state.monthly_limit >= 0.8)
    }

    /// The tighter of the two remaining budgets, treating unlimited (-1) as
    /// absent. Both absent yields the sentinel 1000.0.
    pub fn effective_budget(&self) -> f64 {
        let now = Utc::now();
        let daily = self.remaining_daily_at(now);
        let monthly = self.remaining_monthly_at(now);
        match (daily >= 0.0, monthly >= 0.0) {
            (true, true) => daily.min(monthly),
            (true, false) => daily,
            (false, true) => monthly,
            (false, false) => UNLIMITED_SENTINEL,
        }
    }

    pub fn total_spend(&self) -> f64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.total_spend
    }

    pub fn task_spend(&self, task_id: &str) -> f64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.task_spend.get(task_id).copied().unwrap_or(0.0)
    }

    pub fn snapshot(&self) -> BudgetState {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.clone()
    }
}

/// Zero the period counters whose key no longer matches `now`.
fn rollover(state: &mut BudgetState, now: DateTime<Utc>) {
    let day = day_key(now);
    if day != state.day_key {
        state.daily_spend = 0.0;
        state.day_key = day;
    }
    let month = month_key(now);
    if month != state.month_key {
        state.monthly_spend = 0.0;
        state.month_key = month;
    }
}

/// Period spend as of `now`, without mutating stored keys.
fn effective_spend(state: &BudgetState, now: DateTime<Utc>) -> (f64, f64) {
    let daily = if day_key(now) == state.day_key {
        state.daily_spend
    } else {
        0.0
    };
    let monthly = if month_key(now) == state.month_key {
        state.monthly_spend
    } else {
        0.0
    };
    (daily, monthly)
}

fn day_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

fn month_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    // ─── Arithmetic ─────────────────────────────────────────────

    #[test]
    fn test_record_accumulates() {
        let t = BudgetTracker::new(10.0, 100.0);
        t.record("task-1", 0.25);
        t.record("task-1", 0.10);
        t.record("task-2", 0.05);

        let s = t.snapshot();
        assert!((s.daily_spend - 0.40).abs() < 1e-9);
        assert!((s.monthly_spend - 0.40).abs() < 1e-9);
        assert!((s.total_spend - 0.40).abs() < 1e-9);
        assert!((t.task_spend("task-1") - 0.35).abs() < 1e-9);
        assert!((t.task_spend("task-2") - 0.05).abs() < 1e-9);
        assert_eq!(t.task_spend("task-3"), 0.0);
    }

    #[test]
    fn test_can_spend_respects_both_limits() {
        let t = BudgetTracker::new(1.0, 2.0);
        t.record("t", 0.5);
        assert!(t.can_spend(0.5));
        assert!(!t.can_spend(0.51));

        let t = BudgetTracker::new(0.0, 1.0);
        t.record("t", 0.9);
        assert!(t.can_spend(0.1));
        assert!(!t.can_spend(0.2));
    }

    #[test]
    fn test_unlimited_limits() {
        let t = BudgetTracker::new(0.0, 0.0);
        t.record("t", 500.0);
        assert!(t.can_spend(1_000_000.0));
        assert_eq!(t.remaining_daily(), -1.0);
        assert_eq!(t.remaining_monthly(), -1.0);
        assert_eq!(t.effective_budget(), 1000.0);
        assert!(!t.should_downgrade());
    }

    #[test]
    fn test_remaining_clamps_at_zero() {
        let t = BudgetTracker::new(1.0, 0.0);
        t.record("t", 1.5);
        assert_eq!(t.remaining_daily(), 0.0);
    }

    #[test]
    fn test_should_downgrade_at_80_percent() {
        let t = BudgetTracker::new(1.0, 0.0);
        t.record("t", 0.79);
        assert!(!t.should_downgrade());
        t.record("t", 0.02);
        assert!(t.should_downgrade());

        // Exactly 80% counts as depleted.
        let t = BudgetTracker::new(1.0, 0.0);
        t.record("t", 0.8);
        assert!(t.should_downgrade());
    }

    #[test]
    fn test_effective_budget_takes_tighter() {
        let t = BudgetTracker::new(2.0, 10.0);
        t.record("t", 1.0);
        assert!((t.effective_budget() - 1.0).abs() < 1e-9);

        let t = BudgetTracker::new(0.0, 3.0);
        assert!((t.effective_budget() - 3.0).abs() < 1e-9);
    }

    // ─── Scenario: budget downgrade (monthly-only) ──────────────

    #[test]
    fn test_monthly_only_downgrade_scenario() {
        let t = BudgetTracker::new(0.0, 0.50);
        t.record("t", 0.40);
        assert!(t.can_spend(0.05));
        assert!(!t.can_spend(0.20));
        assert!(t.should_downgrade());
    }

    // ─── Period rollover ────────────────────────────────────────

    #[test]
    fn test_day_rollover_zeroes_daily() {
        let t = BudgetTracker::new(1.0, 10.0);
        t.record_at("t", 0.9, at(2026, 3, 1));
        assert!(!t.can_spend_at(0.2, at(2026, 3, 1)));

        // Next day: daily resets, monthly carries.
        assert!(t.can_spend_at(0.2, at(2026, 3, 2)));
        t.record_at("t", 0.2, at(2026, 3, 2));

        let s = t.snapshot();
        assert!((s.daily_spend - 0.2).abs() < 1e-9);
        assert!((s.monthly_spend - 1.1).abs() < 1e-9);
        assert!((s.total_spend - 1.1).abs() < 1e-9);
        assert_eq!(s.day_key, "2026-03-02");
    }

    #[test]
    fn test_month_rollover_zeroes_monthly() {
        let t = BudgetTracker::new(0.0, 1.0);
        t.record_at("t", 0.9, at(2026, 3, 31));
        assert!(!t.can_spend_at(0.5, at(2026, 3, 31)));
        assert!(t.can_spend_at(0.5, at(2026, 4, 1)));

        t.record_at("t", 0.5, at(2026, 4, 1));
        let s = t.snapshot();
        assert!((s.monthly_spend - 0.5).abs() < 1e-9);
        assert!((s.total_spend - 1.4).abs() < 1e-9);
        assert_eq!(s.month_key, "2026-04");
    }

    #[test]
    fn test_read_before_rollover_record_sees_fresh_period() {
        let t = BudgetTracker::new(1.0, 0.0);
        t.record_at("t", 1.0, at(2026, 5, 10));
        // No mutating call has happened on the 11th yet, but remaining
        // already reflects the new day.
        assert!((t.remaining_daily_at(at(2026, 5, 11)) - 1.0).abs() < 1e-9);
    }
}
