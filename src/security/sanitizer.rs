// src/security/sanitizer.rs — Input cleaning and prompt-injection screening

use std::sync::Mutex;

use regex::Regex;

use crate::infra::config::SecurityConfig;

/// Result of screening one external input. Injection pattern hits are
/// warnings, not blocks: the agent proceeds but the event is auditable.
#[derive(Debug, Clone)]
pub struct SanitizeOutcome {
    pub text: String,
    pub blocked: bool,
    pub reason: String,
    pub warnings: Vec<String>,
}

/// Cleans raw input and screens it against a blocklist plus a compiled set
/// of prompt-injection patterns.
pub struct Sanitizer {
    max_input_length: usize,
    blocklist: Mutex<Vec<String>>,
    patterns: Vec<(Regex, &'static str)>,
}

impl Sanitizer {
    pub fn new(cfg: &SecurityConfig) -> Self {
        Self {
            max_input_length: cfg.max_input_length,
            blocklist: Mutex::new(cfg.blocklist.iter().map(|p| p.to_lowercase()).collect()),
            patterns: injection_patterns(),
        }
    }

    /// Add a blocked phrase at runtime (case-insensitive substring match).
    pub fn add_blocked_phrase(&self, phrase: &str) {
        let mut blocklist = self.blocklist.lock().unwrap_or_else(|e| e.into_inner());
        blocklist.push(phrase.to_lowercase());
    }

    /// Screen raw bytes: invalid UTF-8 sequences are dropped first.
    pub fn sanitize_bytes(&self, input: &[u8]) -> SanitizeOutcome {
        let text: String = String::from_utf8_lossy(input)
            .chars()
            .filter(|c| *c != char::REPLACEMENT_CHARACTER)
            .collect();
        self.sanitize(&text)
    }

    pub fn sanitize(&self, input: &str) -> SanitizeOutcome {
        // Strip ASCII control chars except newline, carriage return, tab.
        let text: String = input
            .chars()
            .filter(|c| !c.is_ascii_control() || matches!(c, '\n' | '\r' | '\t'))
            .collect();

        if text.chars().count() > self.max_input_length {
            return SanitizeOutcome {
                text,
                blocked: true,
                reason: format!("input exceeds {} characters", self.max_input_length),
                warnings: Vec::new(),
            };
        }

        let lowered = text.to_lowercase();
        {
            let blocklist = self.blocklist.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(phrase) = blocklist.iter().find(|p| lowered.contains(p.as_str())) {
                return SanitizeOutcome {
                    text,
                    blocked: true,
                    reason: format!("blocked phrase: {phrase}"),
                    warnings: Vec::new(),
                };
            }
        }

        let warnings: Vec<String> = self
            .patterns
            .iter()
            .filter(|(re, _)| re.is_match(&text))
            .map(|(_, family)| format!("possible prompt injection: {family}"))
            .collect();

        SanitizeOutcome {
            text,
            blocked: false,
            reason: String::new(),
            warnings,
        }
    }
}

/// The screening families. Compiled once per sanitizer; the pattern strings
/// are static so construction cannot fail at runtime.
fn injection_patterns() -> Vec<(Regex, &'static str)> {
    let sources: [(&str, &str); 7] = [
        (
            r"(?i)(ignore|forget|disregard)\s+(all\s+|any\s+)?(previous|prior|above)\s+(instructions|prompts|rules)",
            "override of prior instructions",
        ),
        (r"(?i)you\s+are\s+now\s+(a|an|the)\s+", "role reassignment"),
        (
            r"(?i)act\s+as\s+(system|admin|root|developer)",
            "privileged role request",
        ),
        (
            r"(?i)(show|reveal|print)\s+(me\s+)?your\s+system\s+prompt",
            "system prompt exfiltration",
        ),
        (r"(?i)</system>|\[INST\]|<<SYS>>", "delimiter tag"),
        (
            r"(?i)(eval\s*\(|exec\s*\(|subprocess|os\.system)",
            "code execution string",
        ),
        (r"rm\s+-rf\s+/", "destructive shell command"),
    ];
    sources
        .iter()
        .filter_map(|(src, family)| Regex::new(src).ok().map(|re| (re, *family)))
        .collect()
}
