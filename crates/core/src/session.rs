//! Session Controller
//!
//! Owns the active skill and the transcript and drives one turn end to end:
//! classify (only while no skill is pinned), handle, interpret. The mock store
//! is shared with the host so an operator can edit it between or during turns.

use crate::action::{self, ActionOutcome};
use crate::llm_client::{LLMClient, Turn};
use crate::mock_state::{MockState, MockStateError, MockStore};
use crate::projector::ContextProjector;
use crate::prompts::PromptSet;
use crate::routing::RoutingClassifier;
use crate::skill::{Skill, SkillHandler};
use crate::transcript::{Transcript, TranscriptEntry};
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Reply used when routing cannot tell what the user wants.
pub const CLARIFICATION_REPLY: &str = "Disculpa, no entendí si quieres pausar tu reparto o hacer un pedido urgente. ¿Podrías aclararlo?";

#[derive(Serialize, Debug, Clone, Default)]
pub struct Session {
    pub active_skill: Skill,
    pub transcript: Transcript,
}

/// Result of a single call to [`SessionController::send_utterance`].
#[derive(Serialize, Debug, Clone)]
pub struct TurnOutcome {
    /// Visible agent reply, `None` when the turn failed.
    pub reply: Option<String>,
    /// Entries appended to the transcript by this turn, in order.
    pub transcript_append: Vec<TranscriptEntry>,
    pub skill_now_active: Skill,
}

impl TurnOutcome {
    pub fn failed(&self) -> bool {
        self.reply.is_none()
    }
}

/// Transcript entries and reply produced by a turn that reached the backend
/// successfully. The user entry is added by the caller.
struct TurnResult {
    reply: String,
    entries: Vec<TranscriptEntry>,
}

pub struct SessionController {
    classifier: RoutingClassifier,
    projector: ContextProjector,
    handler: SkillHandler,
    store: MockStore,
    session: Session,
}

impl SessionController {
    pub fn new(llm: Arc<dyn LLMClient>, prompts: Arc<PromptSet>, store: MockStore) -> Self {
        Self {
            classifier: RoutingClassifier::new(llm.clone(), prompts.clone()),
            projector: ContextProjector::new(prompts),
            handler: SkillHandler::new(llm),
            store,
            session: Session::default(),
        }
    }

    pub fn active_skill(&self) -> Skill {
        self.session.active_skill
    }

    pub fn transcript(&self) -> &Transcript {
        &self.session.transcript
    }

    pub async fn get_mock_state(&self) -> MockState {
        self.store.read().await
    }

    /// Operator edit. Invalid JSON or schema violations leave the store as it was.
    pub async fn set_mock_state(&self, raw: &str) -> Result<MockState, MockStateError> {
        self.store.replace_from_json(raw).await
    }

    /// Manual skill override from the host.
    pub fn select_skill(&mut self, skill: Skill) {
        info!(from = %self.session.active_skill, to = %skill, "Skill selected manually");
        self.session.active_skill = skill;
    }

    /// Clears the transcript and returns control to the orchestrator. Mock
    /// state is left alone.
    pub fn reset(&mut self) {
        self.session.transcript.clear();
        self.session.active_skill = Skill::Orchestrator;
        info!("Session reset");
    }

    /// Runs one full turn for `text`.
    ///
    /// A backend failure at any point restores the pre-turn skill, keeps the
    /// user entry and records the error as a SYSTEM entry. The store is only
    /// touched by the action interpreter, after the skill reply has arrived.
    #[instrument(skip_all, fields(skill = %self.session.active_skill))]
    pub async fn send_utterance(&mut self, text: &str) -> TurnOutcome {
        let pre_turn_skill = self.session.active_skill;
        let history = self.session.transcript.turns();
        let mut transcript_append = vec![TranscriptEntry::user(text)];

        let reply = match self.run_turn(text, history).await {
            Ok(result) => {
                transcript_append.extend(result.entries);
                Some(result.reply)
            }
            Err(e) => {
                error!(error = ?e, "Turn failed");
                self.session.active_skill = pre_turn_skill;
                transcript_append.push(TranscriptEntry::system(format!("Error: {e:#}")));
                None
            }
        };

        self.session.transcript.extend(transcript_append.clone());
        TurnOutcome {
            reply,
            transcript_append,
            skill_now_active: self.session.active_skill,
        }
    }

    async fn run_turn(&mut self, text: &str, history: Vec<Turn>) -> Result<TurnResult> {
        let mut entries = Vec::new();

        let skill = match self.session.active_skill {
            Skill::Orchestrator => {
                let verdict = self.classifier.classify(text).await?;
                let Some(skill) = verdict.skill() else {
                    return Ok(TurnResult {
                        reply: CLARIFICATION_REPLY.to_string(),
                        entries: vec![TranscriptEntry::agent(CLARIFICATION_REPLY)],
                    });
                };
                self.session.active_skill = skill;
                entries.push(TranscriptEntry::system(format!(
                    "Derivando a agente especializado: {skill}..."
                )));
                skill
            }
            pinned => pinned,
        };

        // Projection reads the store after routing, right before the skill call.
        let snapshot = self.store.read().await;
        let payload = self.projector.project(skill, &snapshot)?;
        let mut turns = history;
        turns.push(Turn::user(text));
        let raw_reply = self.handler.handle(&payload, turns).await?;

        let interpretation = action::interpret(&raw_reply, &self.store).await;
        if let ActionOutcome::Applied { request, .. } = &interpretation.outcome {
            info!(kind = %request.kind(), "Mock state updated by skill action");
        }
        if !interpretation.visible_reply.is_empty() {
            entries.push(TranscriptEntry::agent(interpretation.visible_reply.clone()));
        }
        if let Some(note) = interpretation.system_note() {
            entries.push(TranscriptEntry::system(note));
        }

        Ok(TurnResult {
            reply: interpretation.visible_reply,
            entries,
        })
    }
}
