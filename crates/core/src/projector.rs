//! Context Projector
//!
//! Builds the instruction payload a skill sends to the generation backend:
//! the skill's rule preamble, a JSON projection restricted to the resources
//! that skill is allowed to see, and the identifiers it may use in an action.
//! The rules in the preamble are advisory for the backend only; the action
//! interpreter enforces the same policy in code.

use crate::mock_state::{MockState, Product};
use crate::prompts::{PromptSet, render};
use crate::skill::Skill;
use anyhow::{Result, bail};
use serde_json::{Value, json};
use std::sync::Arc;

/// The instruction text for one skill invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionPayload {
    pub skill: Skill,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ContextProjector {
    prompts: Arc<PromptSet>,
}

impl ContextProjector {
    pub fn new(prompts: Arc<PromptSet>) -> Self {
        Self { prompts }
    }

    pub fn project(&self, skill: Skill, state: &MockState) -> Result<InstructionPayload> {
        match skill {
            Skill::Pause => self.project_pause(state),
            Skill::Urgent => self.project_urgent(state),
            Skill::Orchestrator => bail!("The orchestrator has no skill instruction payload"),
        }
    }

    fn project_pause(&self, state: &MockState) -> Result<InstructionPayload> {
        let valid_ids: Vec<String> = state
            .pause_support
            .options
            .iter()
            .filter(|o| o.enabled)
            .map(|o| o.id.clone())
            .collect();
        let state_json = serde_json::to_string_pretty(&pause_projection(state))?;
        let text = render(
            self.prompts.pause(),
            &[
                ("state_json", state_json.as_str()),
                ("valid_option_ids", id_list(&valid_ids).as_str()),
            ],
        );
        Ok(InstructionPayload {
            skill: Skill::Pause,
            text,
        })
    }

    fn project_urgent(&self, state: &MockState) -> Result<InstructionPayload> {
        let info = &state.urgent_info;
        let valid_ids: Vec<String> = info.products.iter().map(|p| p.code.clone()).collect();
        let state_json = serde_json::to_string_pretty(&urgent_projection(state))?;
        let current_order = match &info.current_order {
            Some(order) => format!(
                "PEDIDO ACTIVO: Sí, documento {} del {}",
                order.document_number, order.document_date
            ),
            None => "PEDIDO ACTIVO: No".to_string(),
        };
        let text = render(
            self.prompts.urgent(),
            &[
                ("state_json", state_json.as_str()),
                ("product_catalog", render_catalog(&info.products).as_str()),
                ("current_order", current_order.as_str()),
                ("valid_product_codes", id_list(&valid_ids).as_str()),
            ],
        );
        Ok(InstructionPayload {
            skill: Skill::Urgent,
            text,
        })
    }
}

/// The pause blocks, and nothing else.
pub fn pause_projection(state: &MockState) -> Value {
    json!({
        "pause": state.pause,
        "pause_support": state.pause_support,
    })
}

/// Urgent-delivery config plus the invoice gate and active order. The catalog
/// is left out here and rendered separately as a readable list.
pub fn urgent_projection(state: &MockState) -> Value {
    json!({
        "config": state.urgent_config,
        "info": {
            "pending_invoices": state.urgent_info.pending_invoices,
            "current_order": state.urgent_info.current_order,
        },
        "products": "VER LISTA ABAJO",
    })
}

fn render_catalog(products: &[Product]) -> String {
    if products.is_empty() {
        return "No hay productos disponibles.".to_string();
    }
    products
        .iter()
        .map(|p| {
            format!(
                "- ID: {} | Nombre: {} | Desc: {} | Max: {} | Familia: {}",
                p.code,
                p.name,
                p.description.as_deref().unwrap_or(""),
                p.max_quantity,
                serde_json::to_value(p.family)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn id_list(ids: &[String]) -> String {
    if ids.is_empty() {
        "ninguno".to_string()
    } else {
        ids.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_state::{LineItem, Order};
    use chrono::NaiveDate;

    fn projector() -> ContextProjector {
        ContextProjector::new(Arc::new(PromptSet::default()))
    }

    #[test]
    fn pause_payload_only_sees_pause_blocks() {
        let payload = projector().project(Skill::Pause, &MockState::seed()).unwrap();
        assert_eq!(payload.skill, Skill::Pause);
        assert!(payload.text.contains("\"can_request\": true"));
        assert!(!payload.text.contains("\"pending_invoices\""));
        assert!(!payload.text.contains("CAPS ESPRESSO"));
        assert!(!payload.text.contains("{state_json}"));
    }

    #[test]
    fn pause_payload_lists_only_enabled_options() {
        let mut state = MockState::seed();
        state.pause_support.options[0].enabled = false;
        let payload = projector().project(Skill::Pause, &state).unwrap();
        assert!(payload.text.contains("(IDs válidos: cuota_minima)"));
        assert!(!payload.text.contains("plan_completo, cuota_minima"));
    }

    #[test]
    fn urgent_payload_renders_catalog_and_gate() {
        let payload = projector().project(Skill::Urgent, &MockState::seed()).unwrap();
        assert_eq!(payload.text.matches("- ID: ").count(), 6);
        assert!(payload.text.contains(
            "- ID: B20 | Nombre: Botella 20L | Desc: Agua Mineral 20 Litros | Max: 5 | Familia: WATER"
        ));
        assert!(payload.text.contains("\"pending_invoices\": 0"));
        assert!(payload.text.contains("PEDIDO ACTIVO: No"));
        assert!(!payload.text.contains("can_cancel"));
    }

    #[test]
    fn urgent_payload_mentions_active_order() {
        let mut state = MockState::seed();
        state.urgent_info.current_order = Some(Order {
            document_number: "99988877".to_string(),
            document_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            line_items: vec![LineItem {
                product_code: "B20".to_string(),
                quantity: 2,
            }],
        });
        let payload = projector().project(Skill::Urgent, &state).unwrap();
        assert!(payload.text.contains("PEDIDO ACTIVO: Sí, documento 99988877 del 2026-03-01"));
    }

    #[test]
    fn orchestrator_has_no_payload() {
        assert!(projector().project(Skill::Orchestrator, &MockState::seed()).is_err());
    }

    #[test]
    fn empty_catalog_is_explicit() {
        assert_eq!(render_catalog(&[]), "No hay productos disponibles.");
        assert_eq!(id_list(&[]), "ninguno");
    }
}
