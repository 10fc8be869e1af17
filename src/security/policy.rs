// src/security/policy.rs — Pre-execution policy enforcement

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::infra::config::SecurityConfig;

/// Structured rejection value; policy checks never raise errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PolicyViolation {
    MaxConcurrentRuns { active: u32, max: u32 },
    ForbiddenTool { tool: String },
    RequireApproval,
}

impl std::fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyViolation::MaxConcurrentRuns { active, max } => {
                write!(f, "max_concurrent_runs: {active} active of {max} allowed")
            }
            PolicyViolation::ForbiddenTool { tool } => write!(f, "forbidden_tool: {tool}"),
            PolicyViolation::RequireApproval => write!(f, "require_approval"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub violation: Option<PolicyViolation>,
}

impl PolicyDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            violation: None,
        }
    }

    fn deny(violation: PolicyViolation) -> Self {
        Self {
            allowed: false,
            violation: Some(violation),
        }
    }
}

/// Enforces concurrency caps, tool bans, and the approval gate before a run
/// is allowed to execute.
pub struct PolicyEnforcer {
    max_concurrent: u32,
    forbidden_tools: Vec<String>,
    require_approval: bool,
    active: Mutex<HashMap<String, u32>>,
}

impl PolicyEnforcer {
    pub fn new(cfg: &SecurityConfig) -> Self {
        Self {
            max_concurrent: cfg.max_concurrent_runs,
            forbidden_tools: cfg
                .forbidden_tools
                .iter()
                .map(|t| t.to_lowercase())
                .collect(),
            require_approval: cfg.require_approval,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Checks run in order: concurrency, forbidden tool, approval gate.
    pub fn check(&self, agent_id: &str, tool_name: Option<&str>) -> PolicyDecision {
        let active = self.active_runs(agent_id);
        if active >= self.max_concurrent {
            return PolicyDecision::deny(PolicyViolation::MaxConcurrentRuns {
                active,
                max: self.max_concurrent,
            });
        }

        if let Some(tool) = tool_name {
            let lowered = tool.to_lowercase();
            if self.forbidden_tools.iter().any(|f| f == &lowered) {
                return PolicyDecision::deny(PolicyViolation::ForbiddenTool { tool: tool.into() });
            }
        }

        if self.require_approval {
            return PolicyDecision::deny(PolicyViolation::RequireApproval);
        }

        PolicyDecision::allow()
    }

    pub fn acquire_run(&self, agent_id: &str) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        *active.entry(agent_id.to_string()).or_default() += 1;
    }

    pub fn release_run(&self, agent_id: &str) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = active.get_mut(agent_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                active.remove(agent_id);
            }
        }
    }

    pub fn active_runs(&self, agent_id: &str) -> u32 {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.get(agent_id).copied().unwrap_or(0)
    }
}
