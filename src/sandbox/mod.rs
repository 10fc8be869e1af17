// src/sandbox/mod.rs — Isolated code execution port

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::infra::errors::Result;

/// Outcome of a sandboxed code run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u64,
    pub oom_killed: bool,
    pub timed_out: bool,
}

impl ExecResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && !self.oom_killed && !self.timed_out
    }
}

/// Executes generated code in isolation. Container-backed implementations
/// live outside this crate; code skills consume this port.
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn execute(&self, language: &str, code: &str) -> Result<ExecResult>;
}
