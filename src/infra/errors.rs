// src/infra/errors.rs — Error types for Flywheel

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlywheelError>;

#[derive(Error, Debug)]
pub enum FlywheelError {
    // Security (terminal at intake)
    #[error("input blocked: {reason}")]
    InputBlocked { reason: String },

    // Budget (terminal at execute)
    #[error("budget exhausted: needed ${needed:.2}, remaining ${remaining:.2}")]
    BudgetExhausted { needed: f64, remaining: f64 },

    // Provider errors (possibly retriable)
    #[error("LLM provider '{provider}' error: {message}")]
    Llm {
        provider: String,
        message: String,
        retriable: bool,
    },

    // DAG
    #[error("cycle detected in subtask graph")]
    CycleDetected,

    #[error("subtask '{id}' failed: {message}")]
    SubtaskFailed { id: String, message: String },

    // Registries
    #[error("skill '{id}' not found")]
    SkillNotFound { id: String },

    #[error("delegation '{id}' not found")]
    DelegationNotFound { id: String },

    #[error("delegation '{id}' is {status}, expected {expected}")]
    DelegationState {
        id: String,
        status: String,
        expected: String,
    },

    #[error("experiment '{id}' not found")]
    ExperimentNotFound { id: String },

    #[error("experiment '{id}' is not running")]
    ExperimentNotRunning { id: String },

    #[error("A/B test '{id}' not found")]
    AbTestNotFound { id: String },

    #[error("skill '{skill_id}' is not a participant in A/B test '{test_id}'")]
    AbTestParticipant { test_id: String, skill_id: String },

    #[error("goal '{id}' not found")]
    GoalNotFound { id: String },

    #[error("change '{id}' not found")]
    ChangeNotFound { id: String },

    // Validation (skill manifests, config)
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("encryption error: {0}")]
    Crypto(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("MCP error {code}: {message}")]
    Mcp { code: i64, message: String },

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FlywheelError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, FlywheelError::Llm { retriable: true, .. })
    }

    /// True for failures that abort the whole pipeline run (as opposed to
    /// downgrade paths like a skill falling back to an LLM call).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlywheelError::InputBlocked { .. }
                | FlywheelError::BudgetExhausted { .. }
                | FlywheelError::Cancelled(_)
        )
    }
}
