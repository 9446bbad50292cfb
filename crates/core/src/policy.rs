//! Executable business rules for every action a skill can request.
//!
//! The generation backend is told the same rules in its instructions, but its
//! output is untrusted: these checks are what actually decides whether a
//! requested action may touch the mock state. They always run against the
//! state as it is at the moment of applying the action.

use crate::action::{ActionRequest, OrderLine};
use crate::mock_state::{LineItem, MockState, Mutation, Order, ProductFamily, Visibility};
use chrono::{NaiveDate, Utc};
use rand::Rng;
use std::collections::HashSet;
use thiserror::Error;

/// Minimum number of coffee boxes in any order that contains coffee.
pub const COFFEE_MINIMUM: u32 = 3;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("There is no active pause to cancel")]
    NotPaused,
    #[error("The active pause cannot be cancelled from here")]
    CancelNotAllowed,
    #[error("A pause is already active")]
    AlreadyPaused,
    #[error("Pausing deliveries is not offered for this account")]
    PauseDisabled,
    #[error("The account is not allowed to request a pause")]
    RequestNotAllowed,
    #[error("Unknown pause option '{0}'")]
    UnknownOption(String),
    #[error("Pause option '{0}' is disabled")]
    OptionDisabled(String),
    #[error("The account has {0} pending invoice(s)")]
    PendingInvoices(u32),
    #[error("Urgent delivery is hidden for this account")]
    UrgentDeliveryHidden,
    #[error("Unknown product '{0}'")]
    UnknownProduct(String),
    #[error("Product '{0}' appears more than once")]
    DuplicateProduct(String),
    #[error("Requested {quantity} of '{code}' but the maximum is {max}")]
    QuantityExceeded { code: String, quantity: u32, max: u32 },
    #[error("Coffee orders need at least 3 boxes, got {0}")]
    CoffeeMinimum(u32),
    #[error("There is no active order to cancel")]
    NoActiveOrder,
}

/// Document number and date stamped on a newly accepted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentStamp {
    pub number: String,
    pub date: NaiveDate,
}

impl DocumentStamp {
    pub fn fresh() -> Self {
        let number: u32 = rand::rng().random_range(10_000_000..100_000_000);
        Self {
            number: number.to_string(),
            date: Utc::now().date_naive(),
        }
    }
}

/// Decides whether `request` may run against `state`, and if so which
/// mutation it turns into.
pub fn evaluate(
    request: &ActionRequest,
    state: &MockState,
    stamp: DocumentStamp,
) -> Result<Mutation, PolicyViolation> {
    match request {
        ActionRequest::CancelPause => {
            check_cancel_pause(state)?;
            Ok(Mutation::CancelPause)
        }
        ActionRequest::CreatePause { option_id } => {
            check_create_pause(state, option_id)?;
            Ok(Mutation::CreatePause {
                option_id: option_id.clone(),
            })
        }
        ActionRequest::UpdateUrgentOrder(payload) => {
            match check_urgent_order(state, &payload.products)? {
                Some(line_items) => Ok(Mutation::PlaceUrgentOrder(Order {
                    document_number: stamp.number,
                    document_date: stamp.date,
                    line_items,
                })),
                None => Ok(Mutation::ClearUrgentOrder),
            }
        }
    }
}

pub fn check_cancel_pause(state: &MockState) -> Result<(), PolicyViolation> {
    if !state.pause.requested {
        return Err(PolicyViolation::NotPaused);
    }
    if !state.pause_support.can_cancel {
        return Err(PolicyViolation::CancelNotAllowed);
    }
    Ok(())
}

pub fn check_create_pause(state: &MockState, option_id: &str) -> Result<(), PolicyViolation> {
    if state.pause.requested {
        return Err(PolicyViolation::AlreadyPaused);
    }
    if !state.pause.enabled {
        return Err(PolicyViolation::PauseDisabled);
    }
    if !state.pause_support.can_request {
        return Err(PolicyViolation::RequestNotAllowed);
    }
    let option = state
        .pause_support
        .options
        .iter()
        .find(|o| o.id == option_id)
        .ok_or_else(|| PolicyViolation::UnknownOption(option_id.to_string()))?;
    if !option.enabled {
        return Err(PolicyViolation::OptionDisabled(option_id.to_string()));
    }
    Ok(())
}

/// Validates an order update. Returns the line items to store, or `None`
/// when every quantity is zero, which means "cancel the active order".
pub fn check_urgent_order(
    state: &MockState,
    lines: &[OrderLine],
) -> Result<Option<Vec<LineItem>>, PolicyViolation> {
    let info = &state.urgent_info;
    if info.pending_invoices >= 1 {
        return Err(PolicyViolation::PendingInvoices(info.pending_invoices));
    }
    if state.urgent_config.show_urgent_delivery == Visibility::Hidden {
        return Err(PolicyViolation::UrgentDeliveryHidden);
    }

    let mut seen = HashSet::new();
    // Operator-set maxima can be large enough to overflow a u32 sum.
    let mut coffee_total = 0u64;
    let mut line_items = Vec::new();
    for line in lines {
        if !seen.insert(line.id.as_str()) {
            return Err(PolicyViolation::DuplicateProduct(line.id.clone()));
        }
        let product = info
            .product(&line.id)
            .ok_or_else(|| PolicyViolation::UnknownProduct(line.id.clone()))?;
        if line.quantity > product.max_quantity {
            return Err(PolicyViolation::QuantityExceeded {
                code: line.id.clone(),
                quantity: line.quantity,
                max: product.max_quantity,
            });
        }
        if line.quantity == 0 {
            continue;
        }
        if product.family == ProductFamily::Coffee {
            coffee_total += u64::from(line.quantity);
        }
        line_items.push(LineItem {
            product_code: line.id.clone(),
            quantity: line.quantity,
        });
    }

    if line_items.is_empty() {
        if info.current_order.is_none() {
            return Err(PolicyViolation::NoActiveOrder);
        }
        return Ok(None);
    }
    if coffee_total > 0 && coffee_total < u64::from(COFFEE_MINIMUM) {
        return Err(PolicyViolation::CoffeeMinimum(coffee_total as u32));
    }
    Ok(Some(line_items))
}
