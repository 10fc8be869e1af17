// src/soul/mod.rs — Persona port

/// Source of the agent's persona and strategy text, consumed as the leading
/// system prompt. Markdown-file loaders live outside this crate.
pub trait Soul: Send + Sync {
    fn read(&self) -> String;
}

/// Fixed in-memory persona.
pub struct StaticSoul {
    text: String,
}

impl StaticSoul {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Default for StaticSoul {
    fn default() -> Self {
        Self::new(
            "You are a careful, resourceful assistant. Prefer proven skills \
             over improvisation, and say so when you are unsure.",
        )
    }
}

impl Soul for StaticSoul {
    fn read(&self) -> String {
        self.text.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_soul_reads_back() {
        let soul = StaticSoul::new("I am a test persona.");
        assert_eq!(soul.read(), "I am a test persona.");
    }

    #[test]
    fn test_default_soul_nonempty() {
        assert!(!StaticSoul::default().read().is_empty());
    }
}
