//! Mock State Store
//!
//! This module holds the simulated backend resources the skills talk about:
//! the delivery-pause resource with its permission flags, and the urgent
//! delivery configuration, catalog and active order. The state is only ever
//! changed through [`Mutation`]s or through a validated wholesale replacement
//! coming from the operator's mock editor.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

// --- Resource blocks ---

/// Whether pausing deliveries is offered and whether a pause is active.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PauseResource {
    pub enabled: bool,
    pub requested: bool,
}

/// A reason/plan the customer can pick when pausing deliveries.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PauseOption {
    pub id: String,
    pub title: String,
    pub description: String,
    pub enabled: bool,
}

/// Permission flags and catalog of options for the pause resource.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PauseSupport {
    pub can_request: bool,
    pub requested: bool,
    pub can_cancel: bool,
    pub has_pending_invoices: bool,
    pub options: Vec<PauseOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anticipated_next_delivery_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_delivery_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faq_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Feature gate for urgent deliveries.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct UrgentDeliveryConfig {
    pub show_urgent_delivery: Visibility,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductFamily {
    Water,
    Coffee,
    Other,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Product {
    pub code: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub max_quantity: u32,
    pub family: ProductFamily,
    /// Coffee strength on the capsule scale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LineItem {
    pub product_code: String,
    pub quantity: u32,
}

/// An urgent order accepted by the simulated backend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Order {
    pub document_number: String,
    pub document_date: NaiveDate,
    pub line_items: Vec<LineItem>,
}

/// Catalog, invoice gate and active order for urgent deliveries.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct UrgentDeliveryInfo {
    /// `0` means the account is clear; anything above blocks ordering.
    pub pending_invoices: u32,
    pub products: Vec<Product>,
    #[serde(default)]
    pub current_order: Option<Order>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faq_url: Option<String>,
}

impl UrgentDeliveryInfo {
    pub fn product(&self, code: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.code == code)
    }
}

/// The full snapshot of the simulated backend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MockState {
    pub pause: PauseResource,
    pub pause_support: PauseSupport,
    pub urgent_config: UrgentDeliveryConfig,
    pub urgent_info: UrgentDeliveryInfo,
}

// --- Errors ---

/// Reasons a candidate mock state is refused at the store boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MockStateError {
    #[error("Mock state is not well-formed JSON: {0}")]
    InvalidJson(String),
    #[error("Mock state does not match the schema: {0}")]
    Schema(String),
    #[error("pause.requested ({pause}) differs from pause_support.requested ({support})")]
    RequestedMismatch { pause: bool, support: bool },
    #[error("Duplicate pause option id '{0}'")]
    DuplicateOptionId(String),
    #[error("Duplicate product code '{0}'")]
    DuplicateProductCode(String),
    #[error("Current order references unknown product '{0}'")]
    UnknownOrderProduct(String),
    #[error("Current order asks for {quantity} of '{code}' but the maximum is {max}")]
    OrderQuantityExceeded { code: String, quantity: u32, max: u32 },
    #[error("Current order has no line item with a positive quantity; use null to clear it")]
    EmptyOrder,
}

impl MockState {
    /// The demo account the simulator starts with.
    pub fn seed() -> Self {
        let product = |code: &str, name: &str, description: Option<&str>, max, family| Product {
            code: code.to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            max_quantity: max,
            family,
            intensity: None,
        };
        let capsule = |code: &str, name: &str, intensity| Product {
            intensity: Some(intensity),
            ..product(code, name, None, 30, ProductFamily::Coffee)
        };

        Self {
            pause: PauseResource {
                enabled: true,
                requested: false,
            },
            pause_support: PauseSupport {
                can_request: true,
                requested: false,
                can_cancel: false,
                has_pending_invoices: false,
                options: vec![
                    PauseOption {
                        id: "plan_completo".to_string(),
                        title: "Plan completo".to_string(),
                        description: "Seguimos facturando tu plan habitual y las botellas se acumulan en tu saldo.".to_string(),
                        enabled: true,
                    },
                    PauseOption {
                        id: "cuota_minima".to_string(),
                        title: "Cuota mínima".to_string(),
                        description: "Pausas el servicio sin recibir botellas y se aplica una cuota mínima de 4,90 €.".to_string(),
                        enabled: true,
                    },
                ],
                anticipated_next_delivery_date: Some("2026-02-15".to_string()),
                next_delivery_date: Some("2026-02-22".to_string()),
                faq_url: Some("https://example.com/faq".to_string()),
                contact_phone: Some("900 123 456".to_string()),
            },
            urgent_config: UrgentDeliveryConfig {
                show_urgent_delivery: Visibility::Visible,
            },
            urgent_info: UrgentDeliveryInfo {
                pending_invoices: 0,
                products: vec![
                    product("B20", "Botella 20L", Some("Agua Mineral 20 Litros"), 5, ProductFamily::Water),
                    product("SP24", "Botellas 50cl (Caja 24)", None, 5, ProductFamily::Water),
                    capsule("CAPS ESPRESSO", "Café Espresso", 4),
                    capsule("CAPS RISTRETTO", "Café Ristretto", 5),
                    capsule("CAPS DECAFFEINATO", "Café Descafeinado", 3),
                    product("COT VASOS", "Vasos (100u)", None, 10, ProductFamily::Other),
                ],
                current_order: None,
                faq_url: None,
            },
        }
    }

    /// Parses and validates an operator-supplied JSON document.
    pub fn from_json(raw: &str) -> Result<Self, MockStateError> {
        let state: MockState = serde_json::from_str(raw).map_err(|e| {
            if e.is_syntax() || e.is_eof() {
                MockStateError::InvalidJson(e.to_string())
            } else {
                MockStateError::Schema(e.to_string())
            }
        })?;
        state.validate()?;
        Ok(state)
    }

    /// Checks the cross-field invariants that serde alone cannot express.
    pub fn validate(&self) -> Result<(), MockStateError> {
        if self.pause.requested != self.pause_support.requested {
            return Err(MockStateError::RequestedMismatch {
                pause: self.pause.requested,
                support: self.pause_support.requested,
            });
        }

        let mut option_ids = HashSet::new();
        for option in &self.pause_support.options {
            if !option_ids.insert(option.id.as_str()) {
                return Err(MockStateError::DuplicateOptionId(option.id.clone()));
            }
        }

        let mut codes = HashSet::new();
        for product in &self.urgent_info.products {
            if !codes.insert(product.code.as_str()) {
                return Err(MockStateError::DuplicateProductCode(product.code.clone()));
            }
        }

        if let Some(order) = &self.urgent_info.current_order {
            for item in &order.line_items {
                let product = self
                    .urgent_info
                    .product(&item.product_code)
                    .ok_or_else(|| MockStateError::UnknownOrderProduct(item.product_code.clone()))?;
                if item.quantity > product.max_quantity {
                    return Err(MockStateError::OrderQuantityExceeded {
                        code: item.product_code.clone(),
                        quantity: item.quantity,
                        max: product.max_quantity,
                    });
                }
            }
            if order.line_items.iter().all(|item| item.quantity == 0) {
                return Err(MockStateError::EmptyOrder);
            }
        }

        Ok(())
    }

    /// Applies a state transition. Every mutation touches both pause blocks
    /// together so `requested` never drifts between them.
    pub fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::CancelPause => {
                self.pause.requested = false;
                self.pause_support.requested = false;
                self.pause_support.can_cancel = false;
            }
            Mutation::CreatePause { option_id } => {
                debug!(%option_id, "Pause created");
                self.pause.requested = true;
                self.pause_support.requested = true;
                self.pause_support.can_cancel = true;
            }
            Mutation::PlaceUrgentOrder(order) => {
                self.urgent_info.current_order = Some(order);
            }
            Mutation::ClearUrgentOrder => {
                self.urgent_info.current_order = None;
            }
        }
    }
}

impl Default for MockState {
    fn default() -> Self {
        Self::seed()
    }
}

/// A total transition over [`MockState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CancelPause,
    CreatePause { option_id: String },
    PlaceUrgentOrder(Order),
    ClearUrgentOrder,
}

// --- Store ---

/// Shared handle to the mock state.
///
/// Clones share the same state. Every accepted change is broadcast to
/// subscribers so connected hosts can refresh their view of the mocks.
#[derive(Clone, Debug)]
pub struct MockStore {
    state: Arc<Mutex<MockState>>,
    updates: broadcast::Sender<MockState>,
}

impl MockStore {
    pub fn new(initial: MockState) -> Self {
        let (updates, _) = broadcast::channel(16);
        Self {
            state: Arc::new(Mutex::new(initial)),
            updates,
        }
    }

    /// Returns a snapshot of the current state.
    pub async fn read(&self) -> MockState {
        self.state.lock().await.clone()
    }

    pub async fn apply(&self, mutation: Mutation) -> MockState {
        let mut state = self.state.lock().await;
        state.apply(mutation);
        let snapshot = state.clone();
        drop(state);
        self.publish(snapshot.clone());
        snapshot
    }

    /// Derives a mutation from the state as it is *now* and applies it while
    /// still holding the lock, so nothing can slip in between the check and
    /// the write.
    pub async fn transact<E>(
        &self,
        decide: impl FnOnce(&MockState) -> Result<Mutation, E>,
    ) -> Result<MockState, E> {
        let mut state = self.state.lock().await;
        let mutation = decide(&state)?;
        state.apply(mutation);
        let snapshot = state.clone();
        drop(state);
        self.publish(snapshot.clone());
        Ok(snapshot)
    }

    /// Replaces the whole state. Invalid candidates leave the store untouched.
    pub async fn replace(&self, candidate: MockState) -> Result<MockState, MockStateError> {
        if let Err(e) = candidate.validate() {
            warn!(error = %e, "Rejected mock state edit");
            return Err(e);
        }
        *self.state.lock().await = candidate.clone();
        info!("Mock state replaced by operator");
        self.publish(candidate.clone());
        Ok(candidate)
    }

    pub async fn replace_from_json(&self, raw: &str) -> Result<MockState, MockStateError> {
        let candidate = MockState::from_json(raw).inspect_err(|e| {
            warn!(error = %e, "Rejected mock state edit");
        })?;
        self.replace(candidate).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MockState> {
        self.updates.subscribe()
    }

    fn publish(&self, snapshot: MockState) {
        if self.updates.send(snapshot).is_err() {
            debug!("No subscribers for mock state update.");
        }
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new(MockState::seed())
    }
}
