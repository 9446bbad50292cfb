//! Routing Classifier
//!
//! Asks the generation backend which skill should own an utterance. The
//! backend must answer with a single JSON verdict; anything unparseable is
//! read as `UNKNOWN` so a bad reply can never pin a skill.

use crate::llm_client::{GenerationRequest, LLMClient, Turn};
use crate::prompts::PromptSet;
use crate::skill::Skill;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingTarget {
    #[serde(rename = "PAUSE", alias = "STOP_REPARTO")]
    Pause,
    #[serde(rename = "URGENT", alias = "AVISO_URGENTE")]
    Urgent,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

/// The structured answer of the routing step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RoutingVerdict {
    #[serde(rename = "target_agent")]
    pub target: RoutingTarget,
    #[serde(default)]
    pub reason: String,
}

impl RoutingVerdict {
    pub fn unknown(reason: impl Into<String>) -> Self {
        Self {
            target: RoutingTarget::Unknown,
            reason: reason.into(),
        }
    }

    /// Parses a raw backend reply. Never fails: malformed replies become
    /// `UNKNOWN` with the parse error as the reason.
    pub fn parse(raw: &str) -> Self {
        let cleaned = strip_code_fences(raw);
        match serde_json::from_str::<RoutingVerdict>(&cleaned) {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(error = %e, raw = %raw, "Routing verdict could not be parsed");
                Self::unknown(format!("unparseable verdict: {e}"))
            }
        }
    }

    /// The skill this verdict pins, if any.
    pub fn skill(&self) -> Option<Skill> {
        match self.target {
            RoutingTarget::Pause => Some(Skill::Pause),
            RoutingTarget::Urgent => Some(Skill::Urgent),
            RoutingTarget::Unknown => None,
        }
    }
}

/// Removes Markdown code-fence markers the backend sometimes wraps JSON in.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

#[derive(Clone)]
pub struct RoutingClassifier {
    llm: Arc<dyn LLMClient>,
    prompts: Arc<PromptSet>,
}

impl RoutingClassifier {
    pub fn new(llm: Arc<dyn LLMClient>, prompts: Arc<PromptSet>) -> Self {
        Self { llm, prompts }
    }

    /// Classifies a single utterance. Prior transcript is deliberately not sent.
    /// Only a failed backend call is an error; a bad verdict is `UNKNOWN`.
    #[instrument(skip_all)]
    pub async fn classify(&self, utterance: &str) -> Result<RoutingVerdict> {
        let raw = self
            .llm
            .generate(GenerationRequest {
                instructions: self.prompts.routing().to_string(),
                turns: vec![Turn::user(utterance)],
                json_mode: true,
            })
            .await?;
        let verdict = RoutingVerdict::parse(&raw);
        info!(target_agent = ?verdict.target, reason = %verdict.reason, "Routing verdict");
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{MockLLMClient, ScriptedLLMClient};

    #[test]
    fn parses_fenced_verdict() {
        let raw = "```json\n{\"target_agent\": \"PAUSE\", \"reason\": \"quiere parar\"}\n```";
        let verdict = RoutingVerdict::parse(raw);
        assert_eq!(verdict.target, RoutingTarget::Pause);
        assert_eq!(verdict.reason, "quiere parar");
        assert_eq!(verdict.skill(), Some(Skill::Pause));
    }

    #[test]
    fn accepts_legacy_labels() {
        let verdict = RoutingVerdict::parse(r#"{"target_agent": "AVISO_URGENTE"}"#);
        assert_eq!(verdict.skill(), Some(Skill::Urgent));
        assert_eq!(verdict.reason, "");
    }

    #[test]
    fn garbage_becomes_unknown() {
        for raw in ["Hola, ¿en qué te ayudo?", "", "{\"target_agent\": \"BILLING\"}", "[]"] {
            let verdict = RoutingVerdict::parse(raw);
            assert_eq!(verdict.target, RoutingTarget::Unknown, "input: {raw:?}");
            assert_eq!(verdict.skill(), None);
        }
    }

    #[tokio::test]
    async fn classify_sends_only_the_utterance_in_json_mode() {
        let mut llm = MockLLMClient::new();
        llm.expect_generate()
            .withf(|req| {
                req.json_mode && req.turns == vec![Turn::user("Necesito agua urgente")]
            })
            .times(1)
            .returning(|_| Ok(r#"{"target_agent":"URGENT","reason":"pedido"}"#.to_string()));

        let classifier = RoutingClassifier::new(Arc::new(llm), Arc::new(PromptSet::default()));
        let verdict = classifier.classify("Necesito agua urgente").await.unwrap();
        assert_eq!(verdict.skill(), Some(Skill::Urgent));
    }

    #[tokio::test]
    async fn classify_propagates_backend_failure() {
        let llm = ScriptedLLMClient::new([Err("503".to_string())]);
        let classifier = RoutingClassifier::new(Arc::new(llm), Arc::new(PromptSet::default()));
        assert!(classifier.classify("hola").await.is_err());
    }

    #[tokio::test]
    async fn classification_is_stable_for_a_deterministic_backend() {
        let llm = ScriptedLLMClient::from_fn(|req| {
            let text = req.turns[0].text.to_lowercase();
            let target = if text.contains("parar") { "PAUSE" } else { "UNKNOWN" };
            Ok(format!(r#"{{"target_agent":"{target}","reason":"stub"}}"#))
        });
        let classifier = RoutingClassifier::new(Arc::new(llm), Arc::new(PromptSet::default()));

        for utterance in ["Quiero parar mi reparto", "Hola"] {
            let first = classifier.classify(utterance).await.unwrap();
            let second = classifier.classify(utterance).await.unwrap();
            assert_eq!(first.target, second.target);
        }
    }
}
