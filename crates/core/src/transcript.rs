use crate::llm_client::{Turn, TurnRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Agent => write!(f, "agent"),
            Role::System => write!(f, "system"),
        }
    }
}

/// One line of the conversation. Entries are never edited once created.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self::new(Role::Agent, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// The backend only sees user and agent lines; system notes stay local.
    pub fn as_turn(&self) -> Option<Turn> {
        let role = match self.role {
            Role::User => TurnRole::User,
            Role::Agent => TurnRole::Agent,
            Role::System => return None,
        };
        Some(Turn {
            role,
            text: self.content.clone(),
        })
    }
}

/// Append-only conversation log for a session.
#[derive(Serialize, Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = TranscriptEntry>) {
        self.entries.extend(entries);
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Conversation turns to replay to the generation backend.
    pub fn turns(&self) -> Vec<Turn> {
        self.entries.iter().filter_map(TranscriptEntry::as_turn).collect()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_skip_system_entries() {
        let mut transcript = Transcript::new();
        transcript.extend([
            TranscriptEntry::user("Quiero parar mi reparto"),
            TranscriptEntry::system("Derivando a agente especializado: PAUSE..."),
            TranscriptEntry::agent("¿Qué opción prefieres?"),
        ]);

        let turns = transcript.turns();
        assert_eq!(transcript.len(), 3);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, TurnRole::User);
        assert_eq!(turns[1].role, TurnRole::Agent);
        assert_eq!(turns[1].text, "¿Qué opción prefieres?");
    }

    #[test]
    fn entries_get_distinct_ids() {
        let a = TranscriptEntry::user("hola");
        let b = TranscriptEntry::user("hola");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&TranscriptEntry::system("ok")).unwrap();
        assert!(json.contains("\"role\":\"system\""));
        assert_eq!(format!("{}", Role::Agent), "agent");
    }
}
