// src/security/mod.rs — Input sanitizing, rate limiting, policy, audit, crypto

pub mod audit;
pub mod crypto;
pub mod policy;
pub mod rate_limit;
pub mod sanitizer;
pub mod secrets;

pub use audit::{AuditEvent, AuditKind, AuditLog, AuditQuery, AuditSeverity};
pub use crypto::Encryptor;
pub use policy::{PolicyDecision, PolicyEnforcer, PolicyViolation};
pub use rate_limit::RateLimiter;
pub use sanitizer::{SanitizeOutcome, Sanitizer};
pub use secrets::{mask, SecretRegistry};
