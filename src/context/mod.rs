// src/context/mod.rs — Layered context assembly for LLM calls

use crate::provider::{Message, ToolDef};

/// The layers a call site wants in the model's context. System-class layers
/// (persona, tools, memory, insights) are merged; conversational layers
/// follow in order.
#[derive(Debug, Clone, Default)]
pub struct ContextLayers {
    pub system_prompt: String,
    pub task_description: String,
    pub tools: Vec<ToolDef>,
    pub relevant_memory: Vec<String>,
    pub recent_history: Vec<Message>,
    pub skb_insights: Vec<String>,
}

pub trait ContextAssembler: Send + Sync {
    fn assemble(&self, layers: &ContextLayers) -> Vec<Message>;
}

/// Default assembler: one leading system message carrying every
/// system-class layer, then the task block, then recent history.
#[derive(Default)]
pub struct LayeredAssembler;

impl LayeredAssembler {
    pub fn new() -> Self {
        Self
    }
}

impl ContextAssembler for LayeredAssembler {
    fn assemble(&self, layers: &ContextLayers) -> Vec<Message> {
        let mut system = String::new();
        if !layers.system_prompt.is_empty() {
            system.push_str(&layers.system_prompt);
        }
        if !layers.tools.is_empty() {
            system.push_str("\n\n## Available tools\n");
            for tool in &layers.tools {
                system.push_str(&format!("- {}: {}\n", tool.name, tool.description));
            }
        }
        if !layers.relevant_memory.is_empty() {
            system.push_str("\n\n## Relevant memory\n");
            for item in &layers.relevant_memory {
                system.push_str(&format!("- {item}\n"));
            }
        }
        if !layers.skb_insights.is_empty() {
            system.push_str("\n\n## Shared insights\n");
            for item in &layers.skb_insights {
                system.push_str(&format!("- {item}\n"));
            }
        }

        let mut messages = Vec::new();
        if !system.is_empty() {
            messages.push(Message::system(system));
        }
        if !layers.task_description.is_empty() {
            messages.push(Message::user(layers.task_description.clone()));
        }
        messages.extend(layers.recent_history.iter().cloned());
        messages
    }
}
