// src/provider/router.rs — Tiered, budget-aware model selection

use super::{ModelEntry, Tier};

/// Picks a model for a given task complexity under the remaining budget.
///
/// Holds an ordered list of entries; list order is the tie-breaker among
/// same-tier candidates. The fallback ladder is fixed:
/// powerful→mid→cheap, mid→cheap→powerful, cheap→mid→powerful.
#[derive(Debug, Clone)]
pub struct ModelRouter {
    entries: Vec<ModelEntry>,
    provider_filter: Option<String>,
}

impl ModelRouter {
    pub fn new(entries: Vec<ModelEntry>) -> Self {
        Self {
            entries,
            provider_filter: None,
        }
    }

    /// Restrict selection to one provider. Relaxed only as a last resort.
    pub fn with_provider_filter(mut self, provider: impl Into<String>) -> Self {
        self.provider_filter = Some(provider.into());
        self
    }

    /// A three-tier starter table so a bare composition root routes sensibly.
    pub fn with_defaults() -> Self {
        Self::new(vec![
            ModelEntry {
                id: "claude-haiku-3.5".into(),
                provider: "anthropic".into(),
                tier: Tier::Cheap,
                cost_per_1k: 0.001,
            },
            ModelEntry {
                id: "claude-sonnet-4".into(),
                provider: "anthropic".into(),
                tier: Tier::Mid,
                cost_per_1k: 0.009,
            },
            ModelEntry {
                id: "claude-opus-4".into(),
                provider: "anthropic".into(),
                tier: Tier::Powerful,
                cost_per_1k: 0.045,
            },
        ])
    }

    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }

    /// Select a model id for `complexity` ("simple" | "moderate" | "complex",
    /// anything else ⇒ moderate) given the remaining budget in USD.
    /// Returns an empty string only when the entry list is empty.
    pub fn select(&self, complexity: &str, budget_remaining: f64) -> String {
        let mut target = match complexity {
            "simple" => Tier::Cheap,
            "moderate" => Tier::Mid,
            "complex" => Tier::Powerful,
            _ => Tier::Mid,
        };

        // Budget overrides: near-empty forces cheap; tight budget caps at mid.
        if budget_remaining < 0.10 {
            target = Tier::Cheap;
        } else if budget_remaining < 1.0 && target == Tier::Powerful {
            target = Tier::Mid;
        }

        if let Some(entry) = self.find_tier(target) {
            return entry.id.clone();
        }

        for fallback in fallback_ladder(target) {
            if let Some(entry) = self.find_tier(*fallback) {
                return entry.id.clone();
            }
        }

        // No tier matched under the filter: any provider match, then anything.
        if let Some(filter) = &self.provider_filter {
            if let Some(entry) = self.entries.iter().find(|e| &e.provider == filter) {
                return entry.id.clone();
            }
        }
        self.entries
            .first()
            .map(|e| e.id.clone())
            .unwrap_or_default()
    }

    fn find_tier(&self, tier: Tier) -> Option<&ModelEntry> {
        self.entries.iter().find(|e| {
            e.tier == tier
                && self
                    .provider_filter
                    .as_ref()
                    .map(|p| &e.provider == p)
                    .unwrap_or(true)
        })
    }
}

fn fallback_ladder(target: Tier) -> &'static [Tier] {
    match target {
        Tier::Powerful => &[Tier::Mid, Tier::Cheap],
        Tier::Mid => &[Tier::Cheap, Tier::Powerful],
        Tier::Cheap => &[Tier::Mid, Tier::Powerful],
    }
}
