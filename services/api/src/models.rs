//! API Models
//!
//! Request and response bodies of the HTTP API, annotated for OpenAPI
//! generation with `utoipa`. The mock state itself is passed through as JSON:
//! its schema is owned and validated by the core crate.

use chrono::{DateTime, Utc};
use concierge_core::{
    Skill, TurnOutcome,
    llm_client::{Turn, TurnRole},
    preview::Preview,
    transcript::{Role, TranscriptEntry},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActiveSkill {
    Orchestrator,
    Pause,
    Urgent,
}

impl From<Skill> for ActiveSkill {
    fn from(skill: Skill) -> Self {
        match skill {
            Skill::Orchestrator => ActiveSkill::Orchestrator,
            Skill::Pause => ActiveSkill::Pause,
            Skill::Urgent => ActiveSkill::Urgent,
        }
    }
}

impl From<ActiveSkill> for Skill {
    fn from(skill: ActiveSkill) -> Self {
        match skill {
            ActiveSkill::Orchestrator => Skill::Orchestrator,
            ActiveSkill::Pause => Skill::Pause,
            ActiveSkill::Urgent => Skill::Urgent,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryRole {
    User,
    Agent,
    System,
}

impl From<Role> for EntryRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => EntryRole::User,
            Role::Agent => EntryRole::Agent,
            Role::System => EntryRole::System,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct TranscriptEntryView {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    #[schema(value_type = String, example = "agent")]
    pub role: EntryRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&TranscriptEntry> for TranscriptEntryView {
    fn from(entry: &TranscriptEntry) -> Self {
        Self {
            id: entry.id,
            role: entry.role.into(),
            content: entry.content.clone(),
            timestamp: entry.timestamp,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct SendMessagePayload {
    #[schema(example = "Me voy de vacaciones, quiero parar el reparto")]
    pub text: String,
}

/// The result of one conversation turn.
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct TurnResponse {
    /// Visible agent reply; absent when the turn failed.
    pub reply: Option<String>,
    pub transcript_append: Vec<TranscriptEntryView>,
    #[schema(value_type = String, example = "PAUSE")]
    pub skill_now_active: ActiveSkill,
}

impl From<&TurnOutcome> for TurnResponse {
    fn from(outcome: &TurnOutcome) -> Self {
        Self {
            reply: outcome.reply.clone(),
            transcript_append: outcome.transcript_append.iter().map(Into::into).collect(),
            skill_now_active: outcome.skill_now_active.into(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct SessionView {
    #[schema(value_type = String, example = "ORCHESTRATOR")]
    pub active_skill: ActiveSkill,
    pub transcript: Vec<TranscriptEntryView>,
    #[schema(value_type = Object)]
    pub mock_state: serde_json::Value,
}

#[derive(Deserialize, ToSchema)]
pub struct SelectSkillPayload {
    #[schema(value_type = String, example = "URGENT")]
    pub skill: ActiveSkill,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BridgeRole {
    User,
    Agent,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct BridgeTurn {
    #[schema(value_type = String, example = "user")]
    pub role: BridgeRole,
    pub text: String,
}

impl From<BridgeTurn> for Turn {
    fn from(turn: BridgeTurn) -> Self {
        Turn {
            role: match turn.role {
                BridgeRole::User => TurnRole::User,
                BridgeRole::Agent => TurnRole::Agent,
            },
            text: turn.text,
        }
    }
}

/// A one-shot message from an external channel that keeps its own history.
#[derive(Deserialize, ToSchema)]
pub struct BridgeMessagePayload {
    #[schema(example = "Necesito dos botellas de agua para mañana")]
    pub text: String,
    /// Skill to use; routed from `text` when absent.
    #[schema(value_type = Option<String>, example = "URGENT")]
    pub agent: Option<ActiveSkill>,
    #[serde(default)]
    pub history: Vec<BridgeTurn>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct BridgeAction {
    #[schema(example = "CREATE_PAUSE")]
    pub kind: String,
    pub param: Option<String>,
    pub known: bool,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct BridgeResponse {
    /// Reply with action tags removed.
    pub text: String,
    pub raw_response: String,
    #[schema(value_type = Option<String>, example = "PAUSE")]
    pub agent: Option<ActiveSkill>,
    pub has_action: bool,
    pub action: Option<BridgeAction>,
}

impl From<Preview> for BridgeResponse {
    fn from(preview: Preview) -> Self {
        let action = preview.action.map(|a| BridgeAction {
            kind: a.kind,
            param: a.param,
            known: a.known,
        });
        Self {
            text: preview.visible_reply,
            raw_response: preview.raw_reply,
            agent: preview.skill.map(Into::into),
            has_action: action.is_some(),
            action,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_core::preview::ActionPreview;

    #[test]
    fn test_active_skill_serialization() {
        assert_eq!(
            serde_json::to_string(&ActiveSkill::Orchestrator).unwrap(),
            "\"ORCHESTRATOR\""
        );
        let skill: ActiveSkill = serde_json::from_str("\"URGENT\"").unwrap();
        assert_eq!(Skill::from(skill), Skill::Urgent);
        assert!(serde_json::from_str::<ActiveSkill>("\"Billing\"").is_err());
    }

    #[test]
    fn test_transcript_entry_view_from_core() {
        let entry = TranscriptEntry::system("[API] POST /stop-delivery/cancel\n200 OK");
        let view = TranscriptEntryView::from(&entry);

        assert_eq!(view.id, entry.id);
        assert_eq!(view.role, EntryRole::System);
        let json = serde_json::to_string(&view).unwrap();
        assert!(json.contains("\"role\":\"system\""));
    }

    #[test]
    fn test_bridge_payload_defaults() {
        let payload: BridgeMessagePayload =
            serde_json::from_str(r#"{"text": "Hola"}"#).unwrap();
        assert_eq!(payload.text, "Hola");
        assert!(payload.agent.is_none());
        assert!(payload.history.is_empty());

        let payload: BridgeMessagePayload = serde_json::from_str(
            r#"{"text": "Sí", "agent": "PAUSE", "history": [{"role": "agent", "text": "¿Pausamos?"}]}"#,
        )
        .unwrap();
        assert_eq!(payload.agent, Some(ActiveSkill::Pause));
        let turn: Turn = payload.history[0].clone().into();
        assert_eq!(turn.role, TurnRole::Agent);
    }

    #[test]
    fn test_bridge_response_from_preview() {
        let response = BridgeResponse::from(Preview {
            skill: Some(Skill::Pause),
            raw_reply: "Hecho. [[ACTION:CANCEL_PAUSE]]".to_string(),
            visible_reply: "Hecho.".to_string(),
            action: Some(ActionPreview {
                kind: "CANCEL_PAUSE".to_string(),
                param: None,
                known: true,
            }),
        });
        assert!(response.has_action);
        assert_eq!(response.text, "Hecho.");
        assert_eq!(response.agent, Some(ActiveSkill::Pause));

        let response = BridgeResponse::from(Preview {
            skill: None,
            raw_reply: "¿Podrías aclararlo?".to_string(),
            visible_reply: "¿Podrías aclararlo?".to_string(),
            action: None,
        });
        assert!(!response.has_action);
        let json = serde_json::to_value(&response).unwrap();
        assert!(json["agent"].is_null());
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            message: "Invalid mock state".to_string(),
        };
        let json = serde_json::to_string(&error).unwrap();
        assert_eq!(json, r#"{"message":"Invalid mock state"}"#);
    }
}
