//! Action Interpreter
//!
//! Skill replies may end with a command tag such as
//! `[[ACTION:CREATE_PAUSE:cuota_minima]]` or
//! `[[ACTION:UPDATE_URGENT_ORDER:{"products":[{"id":"B20","quantity":2}]}]]`.
//! This module finds the tag, strips it from the text shown to the user,
//! turns it into a typed [`ActionRequest`] and, if the policy allows it
//! against the current mock state, applies the resulting mutation.

use crate::mock_state::{MockState, MockStore};
use crate::policy::{self, DocumentStamp, PolicyViolation};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{info, warn};

// The parameter is matched loosely so malformed payloads are still caught and
// reported instead of leaking into the visible reply.
static ACTION_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\[\[ACTION:([A-Z][A-Z_]*)(?::(.*?))?\]\]").expect("action tag pattern")
});

static OPTION_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+$").expect("option token pattern"));

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    CancelPause,
    CreatePause,
    UpdateUrgentOrder,
}

impl ActionKind {
    pub fn from_tag(kind: &str) -> Option<Self> {
        match kind {
            "CANCEL_PAUSE" => Some(Self::CancelPause),
            "CREATE_PAUSE" => Some(Self::CreatePause),
            "UPDATE_URGENT_ORDER" => Some(Self::UpdateUrgentOrder),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CancelPause => "CANCEL_PAUSE",
            Self::CreatePause => "CREATE_PAUSE",
            Self::UpdateUrgentOrder => "UPDATE_URGENT_ORDER",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    pub id: String,
    pub quantity: u32,
}

/// Body of an `UPDATE_URGENT_ORDER` action.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OrderPayload {
    pub products: Vec<OrderLine>,
}

/// A typed action request parsed from a reply. Lives for one interpretation only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRequest {
    CancelPause,
    CreatePause { option_id: String },
    UpdateUrgentOrder(OrderPayload),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionParseError {
    #[error("Unknown action kind '{0}'")]
    UnknownKind(String),
    #[error("{0} requires a parameter")]
    MissingParameter(ActionKind),
    #[error("Invalid payload for {kind}: {reason}")]
    InvalidPayload { kind: ActionKind, reason: String },
}

/// A command tag as it appears in the raw reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionTag<'a> {
    pub raw: &'a str,
    pub kind: &'a str,
    pub param: Option<&'a str>,
}

/// Returns the first command tag in `reply`, if any.
pub fn find_tag(reply: &str) -> Option<ActionTag<'_>> {
    let captures = ACTION_TAG.captures(reply)?;
    Some(ActionTag {
        raw: captures.get(0)?.as_str(),
        kind: captures.get(1)?.as_str(),
        param: captures.get(2).map(|m| m.as_str()),
    })
}

/// The reply as the user should see it, with every command tag removed.
pub fn strip_tags(reply: &str) -> String {
    ACTION_TAG.replace_all(reply, "").trim().to_string()
}

impl ActionRequest {
    pub fn from_tag(tag: &ActionTag<'_>) -> Result<Self, ActionParseError> {
        let kind = ActionKind::from_tag(tag.kind)
            .ok_or_else(|| ActionParseError::UnknownKind(tag.kind.to_string()))?;
        let param = tag.param.map(str::trim).filter(|p| !p.is_empty());

        match kind {
            ActionKind::CancelPause => Ok(Self::CancelPause),
            ActionKind::CreatePause => {
                let option_id = param.ok_or(ActionParseError::MissingParameter(kind))?;
                if !OPTION_TOKEN.is_match(option_id) {
                    return Err(ActionParseError::InvalidPayload {
                        kind,
                        reason: format!("'{option_id}' is not an option identifier"),
                    });
                }
                Ok(Self::CreatePause {
                    option_id: option_id.to_string(),
                })
            }
            ActionKind::UpdateUrgentOrder => {
                let raw = param.ok_or(ActionParseError::MissingParameter(kind))?;
                let payload: OrderPayload =
                    serde_json::from_str(raw).map_err(|e| ActionParseError::InvalidPayload {
                        kind,
                        reason: e.to_string(),
                    })?;
                Ok(Self::UpdateUrgentOrder(payload))
            }
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::CancelPause => ActionKind::CancelPause,
            Self::CreatePause { .. } => ActionKind::CreatePause,
            Self::UpdateUrgentOrder(_) => ActionKind::UpdateUrgentOrder,
        }
    }
}

/// What happened to the action embedded in a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// The reply carried no command tag.
    NoAction,
    /// The tag named a kind this system does not know.
    Ignored { kind: String },
    /// The tag was recognised but its parameter could not be parsed.
    Malformed(ActionParseError),
    /// The policy refused the request; the state was not touched.
    Rejected {
        request: ActionRequest,
        violation: PolicyViolation,
    },
    Applied {
        request: ActionRequest,
        receipt: String,
        state: MockState,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    pub visible_reply: String,
    pub outcome: ActionOutcome,
}

impl Interpretation {
    /// The SYSTEM transcript note for this outcome. Policy rejections and
    /// unknown kinds stay silent.
    pub fn system_note(&self) -> Option<String> {
        match &self.outcome {
            ActionOutcome::Applied { receipt, .. } => Some(receipt.clone()),
            ActionOutcome::Malformed(e) => Some(format!("[API] Invalid action payload\n{e}")),
            ActionOutcome::NoAction
            | ActionOutcome::Ignored { .. }
            | ActionOutcome::Rejected { .. } => None,
        }
    }

    pub fn applied(&self) -> bool {
        matches!(self.outcome, ActionOutcome::Applied { .. })
    }
}

/// Interprets a raw skill reply against the store.
///
/// Validation and mutation happen in one store transaction, on the state as
/// it is at that moment, not on whatever snapshot the reply was generated from.
pub async fn interpret(reply: &str, store: &MockStore) -> Interpretation {
    let visible_reply = strip_tags(reply);
    let Some(tag) = find_tag(reply) else {
        return Interpretation {
            visible_reply,
            outcome: ActionOutcome::NoAction,
        };
    };

    let extra_tags = ACTION_TAG.find_iter(reply).count() - 1;
    if extra_tags > 0 {
        warn!(extra_tags, "Reply carried more than one action tag; only the first is honoured");
    }

    let request = match ActionRequest::from_tag(&tag) {
        Ok(request) => request,
        Err(ActionParseError::UnknownKind(kind)) => {
            warn!(%kind, "Ignoring unknown action kind");
            return Interpretation {
                visible_reply,
                outcome: ActionOutcome::Ignored { kind },
            };
        }
        Err(e) => {
            warn!(error = %e, tag = %tag.raw, "Malformed action tag");
            return Interpretation {
                visible_reply,
                outcome: ActionOutcome::Malformed(e),
            };
        }
    };

    let stamp = DocumentStamp::fresh();
    let outcome = match store
        .transact(|state| policy::evaluate(&request, state, stamp))
        .await
    {
        Ok(state) => {
            let receipt = receipt_for(&request, &state);
            info!(kind = %request.kind(), "Action applied");
            ActionOutcome::Applied {
                request,
                receipt,
                state,
            }
        }
        Err(violation) => {
            warn!(kind = %request.kind(), %violation, "Action dropped by policy");
            ActionOutcome::Rejected { request, violation }
        }
    };

    Interpretation {
        visible_reply,
        outcome,
    }
}

fn receipt_for(request: &ActionRequest, state: &MockState) -> String {
    match request {
        ActionRequest::CancelPause => "[API] POST /stop-delivery/cancel\n200 OK".to_string(),
        ActionRequest::CreatePause { option_id } => {
            format!("[API] POST /stop-delivery/request\nOption: {option_id}\n200 OK")
        }
        ActionRequest::UpdateUrgentOrder(payload) => {
            let body = serde_json::to_string_pretty(payload).unwrap_or_default();
            match &state.urgent_info.current_order {
                Some(order) => format!(
                    "[API] POST /delivery/urgent\nBody:\n{body}\n200 OK (document {})",
                    order.document_number
                ),
                None => format!("[API] POST /delivery/urgent\nBody:\n{body}\n200 OK (order cancelled)"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_state::{LineItem, Mutation, Order};
    use chrono::NaiveDate;

    fn store_with_order() -> MockStore {
        let mut state = MockState::seed();
        state.apply(Mutation::PlaceUrgentOrder(Order {
            document_number: "12345678".to_string(),
            document_date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            line_items: vec![LineItem {
                product_code: "B20".to_string(),
                quantity: 2,
            }],
        }));
        MockStore::new(state)
    }

    #[test]
    fn finds_token_and_json_parameters() {
        let tag = find_tag("Perfecto. [[ACTION:CREATE_PAUSE:cuota_minima]]").unwrap();
        assert_eq!(tag.kind, "CREATE_PAUSE");
        assert_eq!(tag.param, Some("cuota_minima"));

        let reply = r#"Listo [[ACTION:UPDATE_URGENT_ORDER:{"products":[{"id":"CAPS ESPRESSO","quantity":3}]}]] gracias"#;
        let tag = find_tag(reply).unwrap();
        assert_eq!(
            tag.param,
            Some(r#"{"products":[{"id":"CAPS ESPRESSO","quantity":3}]}"#)
        );
        assert_eq!(strip_tags(reply), "Listo  gracias");

        let tag = find_tag("[[ACTION:CANCEL_PAUSE]]").unwrap();
        assert_eq!(tag.param, None);
        assert!(find_tag("sin acciones [[action:cancel_pause]]").is_none());
    }

    #[test]
    fn only_the_first_tag_is_reported() {
        let reply = "[[ACTION:CANCEL_PAUSE]] y [[ACTION:CREATE_PAUSE:plan_completo]]";
        assert_eq!(find_tag(reply).unwrap().kind, "CANCEL_PAUSE");
        assert_eq!(strip_tags(reply), "y");
    }

    #[test]
    fn parses_requests() {
        let parse = |reply: &str| ActionRequest::from_tag(&find_tag(reply).unwrap());

        assert_eq!(parse("[[ACTION:CANCEL_PAUSE]]"), Ok(ActionRequest::CancelPause));
        assert_eq!(
            parse("[[ACTION:CREATE_PAUSE:plan_completo]]"),
            Ok(ActionRequest::CreatePause {
                option_id: "plan_completo".to_string()
            })
        );
        assert_eq!(
            parse("[[ACTION:CREATE_PAUSE]]"),
            Err(ActionParseError::MissingParameter(ActionKind::CreatePause))
        );
        assert!(matches!(
            parse("[[ACTION:CREATE_PAUSE:Plan Completo]]"),
            Err(ActionParseError::InvalidPayload { .. })
        ));
        assert!(matches!(
            parse(r#"[[ACTION:UPDATE_URGENT_ORDER:{"products":[{"id":"B20"}]}]]"#),
            Err(ActionParseError::InvalidPayload { kind: ActionKind::UpdateUrgentOrder, .. })
        ));
        assert_eq!(
            parse("[[ACTION:ORDER_PIZZA]]"),
            Err(ActionParseError::UnknownKind("ORDER_PIZZA".to_string()))
        );
    }

    #[tokio::test]
    async fn create_pause_applies_with_receipt() {
        let store = MockStore::default();
        let result = interpret(
            "De acuerdo, pauso tu reparto. [[ACTION:CREATE_PAUSE:cuota_minima]]",
            &store,
        )
        .await;

        assert_eq!(result.visible_reply, "De acuerdo, pauso tu reparto.");
        assert!(result.applied());
        let note = result.system_note().unwrap();
        assert!(note.contains("/stop-delivery/request"));
        assert!(note.contains("cuota_minima"));

        let state = store.read().await;
        assert!(state.pause.requested);
        assert!(state.pause_support.requested);
    }

    #[tokio::test]
    async fn rejected_actions_are_silent() {
        let store = MockStore::default();
        let result = interpret("Cancelado. [[ACTION:CANCEL_PAUSE]]", &store).await;

        assert_eq!(result.visible_reply, "Cancelado.");
        assert!(matches!(
            result.outcome,
            ActionOutcome::Rejected {
                violation: PolicyViolation::NotPaused,
                ..
            }
        ));
        assert_eq!(result.system_note(), None);
        assert_eq!(store.read().await, MockState::seed());
    }

    #[tokio::test]
    async fn pending_invoices_gate_orders() {
        let mut state = MockState::seed();
        state.urgent_info.pending_invoices = 1;
        let store = MockStore::new(state.clone());

        let result = interpret(
            r#"Hecho [[ACTION:UPDATE_URGENT_ORDER:{"products":[{"id":"B20","quantity":2}]}]]"#,
            &store,
        )
        .await;

        assert!(!result.applied());
        assert_eq!(store.read().await, state);
    }

    #[tokio::test]
    async fn malformed_payload_is_reported_without_mutation() {
        let store = MockStore::default();
        let result = interpret(
            "Te lo pido ya. [[ACTION:UPDATE_URGENT_ORDER:{products: B20}]]",
            &store,
        )
        .await;

        assert_eq!(result.visible_reply, "Te lo pido ya.");
        assert!(matches!(result.outcome, ActionOutcome::Malformed(_)));
        assert!(result.system_note().unwrap().contains("Invalid action payload"));
        assert_eq!(store.read().await, MockState::seed());
    }

    #[tokio::test]
    async fn unknown_kind_is_ignored() {
        let store = MockStore::default();
        let result = interpret("Vale [[ACTION:SEND_FLOWERS]]", &store).await;
        assert_eq!(result.visible_reply, "Vale");
        assert_eq!(
            result.outcome,
            ActionOutcome::Ignored {
                kind: "SEND_FLOWERS".to_string()
            }
        );
        assert_eq!(result.system_note(), None);
    }

    #[tokio::test]
    async fn all_zero_order_clears_current_order() {
        let store = store_with_order();
        let result = interpret(
            r#"Pedido cancelado. [[ACTION:UPDATE_URGENT_ORDER:{"products":[{"id":"B20","quantity":0}]}]]"#,
            &store,
        )
        .await;

        assert!(result.applied());
        assert!(result.system_note().unwrap().contains("order cancelled"));
        assert_eq!(store.read().await.urgent_info.current_order, None);
    }

    #[tokio::test]
    async fn order_update_replaces_line_items_with_fresh_document() {
        let store = store_with_order();
        let result = interpret(
            r#"[[ACTION:UPDATE_URGENT_ORDER:{"products":[{"id":"CAPS RISTRETTO","quantity":1},{"id":"CAPS ESPRESSO","quantity":2}]}]]"#,
            &store,
        )
        .await;
        assert!(result.applied());

        let order = store.read().await.urgent_info.current_order.unwrap();
        assert_ne!(order.document_number, "12345678");
        assert_eq!(order.line_items.len(), 2);
        assert!(order.line_items.iter().all(|item| item.product_code.starts_with("CAPS")));
    }

    #[tokio::test]
    async fn validation_uses_state_current_at_interpretation_time() {
        let store = MockStore::default();
        // The operator blocks the account after the reply was generated.
        let mut edited = store.read().await;
        edited.urgent_info.pending_invoices = 2;
        store.replace(edited).await.unwrap();

        let result = interpret(
            r#"[[ACTION:UPDATE_URGENT_ORDER:{"products":[{"id":"B20","quantity":1}]}]]"#,
            &store,
        )
        .await;
        assert!(matches!(
            result.outcome,
            ActionOutcome::Rejected {
                violation: PolicyViolation::PendingInvoices(2),
                ..
            }
        ));
    }
}
