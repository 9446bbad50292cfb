//! Prompt Templates
//!
//! Instruction templates for the routing step and each skill. Built-in
//! defaults are compiled into the crate; a deployment can override any of
//! them with a Markdown file of the same stem (`routing.md`, `pause.md`,
//! `urgent.md`). Templates use `{name}` placeholders filled at projection time.

use std::collections::HashMap;
use tracing::{info, warn};

pub const ROUTING_KEY: &str = "routing";
pub const PAUSE_KEY: &str = "pause";
pub const URGENT_KEY: &str = "urgent";

/// The complete set of instruction templates used by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    routing: String,
    pause: String,
    urgent: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            routing: include_str!("../prompts/routing.md").to_string(),
            pause: include_str!("../prompts/pause.md").to_string(),
            urgent: include_str!("../prompts/urgent.md").to_string(),
        }
    }
}

impl PromptSet {
    /// Starts from the built-in templates and replaces those present in
    /// `overrides`, keyed by file stem. Unknown keys are ignored.
    pub fn with_overrides(overrides: HashMap<String, String>) -> Self {
        let mut prompts = Self::default();
        for (key, template) in overrides {
            match key.as_str() {
                ROUTING_KEY => prompts.routing = template,
                PAUSE_KEY => prompts.pause = template,
                URGENT_KEY => prompts.urgent = template,
                _ => {
                    warn!(%key, "Ignoring unknown prompt template");
                    continue;
                }
            }
            info!(%key, "Prompt template overridden");
        }
        prompts
    }

    pub fn routing(&self) -> &str {
        &self.routing
    }

    pub fn pause(&self) -> &str {
        &self.pause
    }

    pub fn urgent(&self) -> &str {
        &self.urgent
    }
}

/// Substitutes every `{name}` placeholder listed in `values`.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |acc, (name, value)| {
            acc.replace(&format!("{{{name}}}"), value)
        })
}
