use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use slabledger_core::{Entity, StockId};

use crate::unit::Assignment;

/// A unit's pending commitment to a client before the sale is confirmed.
///
/// Keyed by the unit: at most one reservation exists per unit, and only while
/// the unit is `Out`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub stock_id: StockId,
    pub assignment: Assignment,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    pub fn open(stock_id: StockId, assignment: Assignment, created_at: DateTime<Utc>) -> Self {
        Self {
            stock_id,
            assignment,
            notes: String::new(),
            created_at,
        }
    }
}

impl Entity for Reservation {
    type Id = StockId;

    fn id(&self) -> &Self::Id {
        &self.stock_id
    }
}

/// How a transition treats the unit's reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationChange {
    /// Create one from the unit's assignment. Fails if one already exists.
    Open,
    /// Remove it if present.
    Close,
}
