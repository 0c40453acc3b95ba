//! The stock ledger transition table.
//!
//! `plan` is pure decision logic: given a unit and a requested operation it
//! either rejects the request or describes, completely, the change to apply.
//! Applying the change atomically is the store's job.
//!
//! | From      | Operation             | To        | Counter delta            |
//! |-----------|-----------------------|-----------|--------------------------|
//! | Available | mark-out              | Out       | `out += 1`               |
//! | Out       | clear-sale            | Sold      | `out -= 1; sold += 1`    |
//! | Out       | return (before)       | Available | `out -= 1; returned += 1`|
//! | Sold      | return (after)        | Available | `sold -= 1; returned += 1`|
//! | Sold      | undo-sale             | Out       | `out += 1; sold -= 1`    |

use slabledger_core::{DomainError, DomainResult};

use crate::batch::CounterDelta;
use crate::movement::{DeliveryMode, MovementKind};
use crate::reservation::ReservationChange;
use crate::returns::ReturnPhase;
use crate::status::UnitStatus;
use crate::unit::{Assignment, AssignmentChange, StockUnit};

/// A request to move one unit through the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOperation {
    MarkOut {
        assignment: Assignment,
        mode: DeliveryMode,
    },
    ClearSale,
    Return {
        phase: ReturnPhase,
        reason: String,
    },
    UndoSale {
        reason: String,
    },
}

impl LedgerOperation {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerOperation::MarkOut { .. } => "mark_out",
            LedgerOperation::ClearSale => "clear_sale",
            LedgerOperation::Return { phase: ReturnPhase::Before, .. } => "return_before_invoice",
            LedgerOperation::Return { phase: ReturnPhase::After, .. } => "return_after_sale",
            LedgerOperation::UndoSale { .. } => "undo_sale",
        }
    }
}

/// Fully described change to one unit, its batch, its reservation and the logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: UnitStatus,
    pub to: UnitStatus,
    pub counters: CounterDelta,
    pub assignment: AssignmentChange,
    pub reservation: ReservationChange,
    pub movement_kind: MovementKind,
    /// Client/delivery order recorded on the movement.
    pub logged_assignment: Option<Assignment>,
    pub delivery_mode: Option<DeliveryMode>,
    pub reason: Option<String>,
    /// Set when the transition must also append a returns-register entry.
    pub return_phase: Option<ReturnPhase>,
}

/// Decide the transition for `operation` on `unit`, or reject it.
///
/// Rejections never describe a partial change: either the whole transition is
/// legal from the unit's current status or nothing is returned.
pub fn plan(unit: &StockUnit, operation: &LedgerOperation) -> DomainResult<Transition> {
    let from = unit.status();
    match operation {
        LedgerOperation::MarkOut { assignment, mode } => {
            if from.is_committed() {
                return Err(DomainError::conflict(format!(
                    "stock unit {} is already {from}",
                    unit.item_code()
                )));
            }
            if !from.is_dispatchable() {
                return Err(DomainError::invalid_state(format!(
                    "stock unit {} is {from} and has not been received",
                    unit.item_code()
                )));
            }
            Ok(Transition {
                from,
                to: UnitStatus::Out,
                counters: CounterDelta::MARK_OUT,
                assignment: AssignmentChange::Set(assignment.clone()),
                reservation: ReservationChange::Open,
                movement_kind: MovementKind::Out,
                logged_assignment: Some(assignment.clone()),
                delivery_mode: Some(*mode),
                reason: None,
                return_phase: None,
            })
        }
        LedgerOperation::ClearSale => {
            require(unit, UnitStatus::Out, "cannot clear reservation")?;
            Ok(Transition {
                from,
                to: UnitStatus::Sold,
                counters: CounterDelta::CLEAR_SALE,
                assignment: AssignmentChange::Keep,
                reservation: ReservationChange::Close,
                movement_kind: MovementKind::Sold,
                logged_assignment: unit.assignment().cloned(),
                delivery_mode: Some(DeliveryMode::ReservedClear),
                reason: None,
                return_phase: None,
            })
        }
        LedgerOperation::Return { phase, reason } => {
            let (required, counters) = match phase {
                ReturnPhase::Before => (UnitStatus::Out, CounterDelta::RETURN_BEFORE_INVOICE),
                ReturnPhase::After => (UnitStatus::Sold, CounterDelta::RETURN_AFTER_SALE),
            };
            require(unit, required, "cannot return")?;
            Ok(Transition {
                from,
                to: UnitStatus::Available,
                counters,
                assignment: AssignmentChange::Clear,
                // Sold units hold no reservation; closing is a no-op then.
                reservation: ReservationChange::Close,
                movement_kind: phase.movement_kind(),
                logged_assignment: unit.assignment().cloned(),
                delivery_mode: None,
                reason: Some(reason.trim().to_string()),
                return_phase: Some(*phase),
            })
        }
        LedgerOperation::UndoSale { reason } => {
            require(unit, UnitStatus::Sold, "cannot undo sale")?;
            // Sold units keep their assignment precisely so it can be restored here.
            let assignment = unit.assignment().cloned().ok_or_else(|| {
                DomainError::invariant(format!(
                    "sold stock unit {} has no client/delivery order to restore",
                    unit.item_code()
                ))
            })?;
            Ok(Transition {
                from,
                to: UnitStatus::Out,
                counters: CounterDelta::UNDO_SALE,
                assignment: AssignmentChange::Keep,
                reservation: ReservationChange::Open,
                movement_kind: MovementKind::UndoSale,
                logged_assignment: Some(assignment),
                delivery_mode: None,
                reason: Some(reason.trim().to_string()),
                return_phase: None,
            })
        }
    }
}

fn require(unit: &StockUnit, expected: UnitStatus, action: &str) -> DomainResult<()> {
    if unit.status() != expected {
        return Err(DomainError::invalid_state(format!(
            "stock unit {} is {}, not {expected}: {action}",
            unit.item_code(),
            unit.status()
        )));
    }
    Ok(())
}
