use crate::llm_client::{GenerationRequest, LLMClient, Turn};
use crate::projector::InstructionPayload;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Which handler owns the conversation right now.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Skill {
    /// No skill pinned yet; the next utterance goes through routing.
    #[default]
    Orchestrator,
    Pause,
    Urgent,
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Skill::Orchestrator => write!(f, "ORCHESTRATOR"),
            Skill::Pause => write!(f, "PAUSE"),
            Skill::Urgent => write!(f, "URGENT"),
        }
    }
}

/// Forwards a skill's instruction payload and the conversation to the
/// generation backend and hands back the reply exactly as produced,
/// action tag included.
#[derive(Clone)]
pub struct SkillHandler {
    llm: Arc<dyn LLMClient>,
}

impl SkillHandler {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }

    #[instrument(skip_all, fields(skill = %payload.skill))]
    pub async fn handle(&self, payload: &InstructionPayload, turns: Vec<Turn>) -> Result<String> {
        let reply = self
            .llm
            .generate(GenerationRequest {
                instructions: payload.text.clone(),
                turns,
                json_mode: false,
            })
            .await?;
        debug!(reply_len = reply.len(), "Skill reply received");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::MockLLMClient;

    #[test]
    fn skill_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Skill::Urgent).unwrap(), "\"URGENT\"");
        let skill: Skill = serde_json::from_str("\"PAUSE\"").unwrap();
        assert_eq!(skill, Skill::Pause);
        assert_eq!(Skill::default(), Skill::Orchestrator);
    }

    #[tokio::test]
    async fn handler_forwards_payload_and_raw_reply() {
        let mut llm = MockLLMClient::new();
        llm.expect_generate()
            .withf(|req| req.instructions == "rules" && !req.json_mode && req.turns.len() == 1)
            .times(1)
            .returning(|_| Ok("Hecho. [[ACTION:CANCEL_PAUSE]]".to_string()));

        let handler = SkillHandler::new(Arc::new(llm));
        let payload = InstructionPayload {
            skill: Skill::Pause,
            text: "rules".to_string(),
        };
        let reply = handler.handle(&payload, vec![Turn::user("sí")]).await.unwrap();
        assert_eq!(reply, "Hecho. [[ACTION:CANCEL_PAUSE]]");
    }
}
