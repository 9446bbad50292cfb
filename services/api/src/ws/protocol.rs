//! Defines the WebSocket message protocol between the browser client and the API server.

use crate::models::{ActiveSkill, TranscriptEntryView};
use concierge_core::MockState;
use serde::{Deserialize, Serialize};

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A text message from the user to the agent.
    UserMessage { text: String },
    /// Pins a skill, or hands control back to the orchestrator.
    SelectSkill { skill: ActiveSkill },
    /// Clears the transcript.
    Reset,
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once on connect with everything needed to render the session.
    Initialized {
        active_skill: ActiveSkill,
        transcript: Vec<TranscriptEntryView>,
        mock_state: MockState,
    },
    /// The result of one turn. `reply` is null when the backend call failed.
    TurnComplete {
        reply: Option<String>,
        transcript_append: Vec<TranscriptEntryView>,
        skill_now_active: ActiveSkill,
    },
    SkillSelected { active_skill: ActiveSkill },
    SessionReset,
    /// Pushed on every mock-state change, whether from an action or an operator edit.
    StateUpdate { mock_state: MockState },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_parsing() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "user_message", "text": "Hola"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::UserMessage {
                text: "Hola".to_string()
            }
        );

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "select_skill", "skill": "PAUSE"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::SelectSkill {
                skill: ActiveSkill::Pause
            }
        );

        let msg: ClientMessage = serde_json::from_str(r#"{"type": "reset"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Reset);

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type": "init"}"#).is_err());
    }

    #[test]
    fn test_server_message_tags() {
        let json = serde_json::to_value(ServerMessage::StateUpdate {
            mock_state: MockState::seed(),
        })
        .unwrap();
        assert_eq!(json["type"], "state_update");
        assert_eq!(json["mock_state"]["pause"]["requested"], false);

        let json = serde_json::to_value(ServerMessage::TurnComplete {
            reply: None,
            transcript_append: vec![],
            skill_now_active: ActiveSkill::Orchestrator,
        })
        .unwrap();
        assert_eq!(json["type"], "turn_complete");
        assert!(json["reply"].is_null());
        assert_eq!(json["skill_now_active"], "ORCHESTRATOR");
    }
}
