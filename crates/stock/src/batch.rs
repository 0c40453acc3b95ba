use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use slabledger_core::{AggregateRoot, BatchId, DomainError, DomainResult, PoItemId, ValueObject};

/// Relative change to a batch's counters, applied inside a single commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDelta {
    pub out: i64,
    pub sold: i64,
    pub returned: i64,
}

impl ValueObject for CounterDelta {}

impl CounterDelta {
    pub const MARK_OUT: CounterDelta = CounterDelta { out: 1, sold: 0, returned: 0 };
    pub const CLEAR_SALE: CounterDelta = CounterDelta { out: -1, sold: 1, returned: 0 };
    pub const RETURN_BEFORE_INVOICE: CounterDelta = CounterDelta { out: -1, sold: 0, returned: 1 };
    pub const RETURN_AFTER_SALE: CounterDelta = CounterDelta { out: 0, sold: -1, returned: 1 };
    pub const UNDO_SALE: CounterDelta = CounterDelta { out: 1, sold: -1, returned: 0 };

    pub fn is_zero(&self) -> bool {
        self.out == 0 && self.sold == 0 && self.returned == 0
    }

    /// Change in `available` implied by this delta.
    pub fn available(&self) -> i64 {
        -(self.out + self.sold)
    }
}

/// Counter snapshot of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounters {
    pub quantity: i64,
    pub out: i64,
    pub sold: i64,
    pub returned: i64,
}

impl BatchCounters {
    pub fn available(&self) -> i64 {
        self.quantity - self.out - self.sold
    }

    /// Check every batch invariant:
    /// `out, sold, returned >= 0`, `out + sold <= quantity`.
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity < 0 {
            return Err(DomainError::invariant("batch quantity cannot be negative"));
        }
        if self.out < 0 || self.sold < 0 || self.returned < 0 {
            return Err(DomainError::invariant(format!(
                "batch counters cannot go negative (out={}, sold={}, returned={})",
                self.out, self.sold, self.returned
            )));
        }
        if self.out + self.sold > self.quantity {
            return Err(DomainError::invariant(format!(
                "out + sold exceeds quantity (out={}, sold={}, quantity={})",
                self.out, self.sold, self.quantity
            )));
        }
        Ok(())
    }

    /// Apply a delta, returning the new counters if every invariant still holds.
    pub fn apply(&self, delta: CounterDelta) -> DomainResult<BatchCounters> {
        let next = BatchCounters {
            quantity: self.quantity,
            out: self.out + delta.out,
            sold: self.sold + delta.sold,
            returned: self.returned + delta.returned,
        };
        next.validate()?;
        Ok(next)
    }
}

/// Aggregate root: a receipt lot of identical units from one purchase-order item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    id: BatchId,
    po_item_id: PoItemId,
    code: String,
    counters: BatchCounters,
    arrival_date: NaiveDate,
    version: u64,
}

impl Batch {
    /// Create a fresh batch with all counters at zero.
    pub fn new(
        id: BatchId,
        po_item_id: PoItemId,
        code: impl Into<String>,
        quantity: i64,
        arrival_date: NaiveDate,
    ) -> DomainResult<Self> {
        if quantity <= 0 {
            return Err(DomainError::validation("batch quantity must be positive"));
        }
        let code = code.into();
        if code.trim().is_empty() {
            return Err(DomainError::validation("batch code cannot be empty"));
        }
        Ok(Self {
            id,
            po_item_id,
            code,
            counters: BatchCounters { quantity, out: 0, sold: 0, returned: 0 },
            arrival_date,
            version: 0,
        })
    }

    /// Rebuild a batch from persisted state, rejecting rows that break invariants.
    pub fn restore(
        id: BatchId,
        po_item_id: PoItemId,
        code: String,
        counters: BatchCounters,
        arrival_date: NaiveDate,
        version: u64,
    ) -> DomainResult<Self> {
        counters.validate()?;
        Ok(Self { id, po_item_id, code, counters, arrival_date, version })
    }

    pub fn id_typed(&self) -> BatchId {
        self.id
    }

    pub fn po_item_id(&self) -> PoItemId {
        self.po_item_id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn counters(&self) -> BatchCounters {
        self.counters
    }

    pub fn quantity(&self) -> i64 {
        self.counters.quantity
    }

    pub fn out(&self) -> i64 {
        self.counters.out
    }

    pub fn sold(&self) -> i64 {
        self.counters.sold
    }

    pub fn returned(&self) -> i64 {
        self.counters.returned
    }

    /// Always derived: `quantity - out - sold`.
    pub fn available(&self) -> i64 {
        self.counters.available()
    }

    pub fn arrival_date(&self) -> NaiveDate {
        self.arrival_date
    }

    /// Apply a relative counter change. On error, the batch is left untouched.
    pub fn apply_delta(&mut self, delta: CounterDelta) -> DomainResult<()> {
        if delta.is_zero() {
            return Ok(());
        }
        self.counters = self.counters.apply(delta)?;
        self.version += 1;
        Ok(())
    }
}

impl AggregateRoot for Batch {
    type Id = BatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
