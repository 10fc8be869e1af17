// src/security/secrets.rs — Known-secret masking for outgoing text

use std::sync::Mutex;

const MIN_SECRET_LEN: usize = 4;
const SHOW_CHARS: usize = 2;

/// Mask `value` keeping the first and last `show` characters. Values short
/// enough that affixes would leak most of the secret are fully masked.
pub fn mask(value: &str, show: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 2 * show {
        return "*".repeat(chars.len());
    }
    let prefix: String = chars[..show].iter().collect();
    let suffix: String = chars[chars.len() - show..].iter().collect();
    format!("{prefix}{}{suffix}", "*".repeat(chars.len() - 2 * show))
}

/// Registry of known secret strings, used to scrub outgoing results before
/// they leave the pipeline.
#[derive(Default)]
pub struct SecretRegistry {
    secrets: Mutex<Vec<String>>,
}

impl SecretRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret for masking. Values under 4 characters are
    /// ignored; masking them would flag every short substring.
    pub fn register(&self, secret: &str) {
        if secret.len() < MIN_SECRET_LEN {
            tracing::warn!("ignoring secret shorter than {} chars", MIN_SECRET_LEN);
            return;
        }
        let mut secrets = self.secrets.lock().unwrap_or_else(|e| e.into_inner());
        if !secrets.iter().any(|s| s == secret) {
            secrets.push(secret.to_string());
        }
    }

    /// Replace every occurrence of every known secret in `text`.
    pub fn sanitize(&self, text: &str) -> String {
        let secrets = self.secrets.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = text.to_string();
        for secret in secrets.iter() {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), &mask(secret, SHOW_CHARS));
            }
        }
        out
    }

    pub fn count(&self) -> usize {
        let secrets = self.secrets.lock().unwrap_or_else(|e| e.into_inner());
        secrets.len()
    }
}
