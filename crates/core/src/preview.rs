//! One-shot, read-only turns for external bridges (telephony and the like).
//!
//! The bridge keeps its own conversation state, so nothing here touches a
//! session or the store: the reply is generated against a snapshot and any
//! action tag is only reported back to the caller.

use crate::action::{self, ActionKind};
use crate::llm_client::{LLMClient, Turn};
use crate::mock_state::MockState;
use crate::projector::ContextProjector;
use crate::prompts::PromptSet;
use crate::routing::RoutingClassifier;
use crate::session::CLARIFICATION_REPLY;
use crate::skill::{Skill, SkillHandler};
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

/// The action a reply asked for, as written. Not validated.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ActionPreview {
    pub kind: String,
    pub param: Option<String>,
    /// Whether `kind` is one this system knows how to execute.
    pub known: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    /// The skill that produced the reply; `None` when routing was inconclusive.
    pub skill: Option<Skill>,
    pub raw_reply: String,
    pub visible_reply: String,
    pub action: Option<ActionPreview>,
}

#[derive(Clone)]
pub struct Previewer {
    classifier: RoutingClassifier,
    projector: ContextProjector,
    handler: SkillHandler,
}

impl Previewer {
    pub fn new(llm: Arc<dyn LLMClient>, prompts: Arc<PromptSet>) -> Self {
        Self {
            classifier: RoutingClassifier::new(llm.clone(), prompts.clone()),
            projector: ContextProjector::new(prompts),
            handler: SkillHandler::new(llm),
        }
    }

    /// Generates a reply for `text`. When `skill` is `None` or the orchestrator,
    /// the utterance is classified first.
    #[instrument(skip_all)]
    pub async fn preview(
        &self,
        text: &str,
        skill: Option<Skill>,
        history: Vec<Turn>,
        state: &MockState,
    ) -> Result<Preview> {
        let skill = match skill {
            Some(Skill::Pause) => Skill::Pause,
            Some(Skill::Urgent) => Skill::Urgent,
            Some(Skill::Orchestrator) | None => {
                match self.classifier.classify(text).await?.skill() {
                    Some(skill) => skill,
                    None => {
                        return Ok(Preview {
                            skill: None,
                            raw_reply: CLARIFICATION_REPLY.to_string(),
                            visible_reply: CLARIFICATION_REPLY.to_string(),
                            action: None,
                        });
                    }
                }
            }
        };

        let payload = self.projector.project(skill, state)?;
        let mut turns = history;
        turns.push(Turn::user(text));
        let raw_reply = self.handler.handle(&payload, turns).await?;

        let action = action::find_tag(&raw_reply).map(|tag| ActionPreview {
            kind: tag.kind.to_string(),
            param: tag.param.map(str::to_string),
            known: ActionKind::from_tag(tag.kind).is_some(),
        });
        debug!(has_action = action.is_some(), "Preview generated");

        Ok(Preview {
            skill: Some(skill),
            visible_reply: action::strip_tags(&raw_reply),
            raw_reply,
            action,
        })
    }
}
