use std::sync::Arc;

use thiserror::Error;

use slabledger_core::{BatchId, ClientId, DomainError, ExpectedVersion, PoItemId, StockId};
use slabledger_stock::{
    AssignmentChange, Batch, CounterDelta, MovementRecord, Reservation, ReservationChange,
    ReturnEntry, StockUnit, UnitStatus,
};

/// Everything one ledger transition writes, submitted as a single atomic commit.
///
/// The store re-checks `expected_status` and `expected_version` against the unit
/// at write time. If either no longer holds, nothing is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionCommit {
    pub stock_id: StockId,
    pub batch_id: BatchId,
    pub expected_status: UnitStatus,
    pub expected_version: ExpectedVersion,
    pub to: UnitStatus,
    pub assignment: AssignmentChange,
    /// Applied relative to the batch's counters as stored at commit time.
    pub counters: CounterDelta,
    /// `Open` creates the reservation from the unit's resulting assignment.
    pub reservation: ReservationChange,
    pub movement: MovementRecord,
    pub return_entry: Option<ReturnEntry>,
}

/// State after a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedTransition {
    pub unit: StockUnit,
    pub batch: Batch,
    pub movement: MovementRecord,
    pub return_entry: Option<ReturnEntry>,
}

/// Storage-layer failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A concurrent writer changed the row first, or a uniqueness rule was hit.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The write would break a batch or reservation invariant.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Connection, lock or runtime failure.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl From<DomainError> for StoreError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Conflict(msg) => StoreError::Conflict(msg),
            DomainError::NotFound(msg) => StoreError::NotFound(msg),
            DomainError::InvariantViolation(msg) => StoreError::InvariantViolation(msg),
            other => StoreError::InvariantViolation(other.to_string()),
        }
    }
}

/// Storage boundary for stock units, batches, reservations, the movement log,
/// the returns register and the (read-only) client directory.
///
/// Implementations must make `commit`, `register_batch` and `receive_units`
/// all-or-nothing and must serialize concurrent commits against the same unit.
pub trait LedgerStore: Send + Sync {
    fn unit(&self, stock_id: StockId) -> Result<Option<StockUnit>, StoreError>;

    /// Exact match on the short display barcode.
    fn unit_by_barcode(&self, barcode: &str) -> Result<Option<StockUnit>, StoreError>;

    /// Exact match on the canonical item code.
    fn unit_by_item_code(&self, item_code: &str) -> Result<Option<StockUnit>, StoreError>;

    /// Units of a batch, ordered by item code piece number.
    fn units_in_batch(&self, batch_id: BatchId) -> Result<Vec<StockUnit>, StoreError>;

    fn batch(&self, batch_id: BatchId) -> Result<Option<Batch>, StoreError>;

    fn batch_for_po_item(&self, po_item_id: PoItemId) -> Result<Option<Batch>, StoreError>;

    fn reservation(&self, stock_id: StockId) -> Result<Option<Reservation>, StoreError>;

    /// Movement records of one unit, oldest first.
    fn movements(&self, stock_id: StockId) -> Result<Vec<MovementRecord>, StoreError>;

    /// Returns register, newest first.
    fn returns(&self) -> Result<Vec<ReturnEntry>, StoreError>;

    fn client_name(&self, client_id: ClientId) -> Result<Option<String>, StoreError>;

    /// Apply one ledger transition atomically.
    fn commit(&self, commit: TransitionCommit) -> Result<CommittedTransition, StoreError>;

    /// Insert a new batch together with all of its units.
    ///
    /// Fails with `Conflict` if the purchase-order item already has a batch or
    /// any item code or barcode is already taken.
    fn register_batch(&self, batch: Batch, units: Vec<StockUnit>) -> Result<(), StoreError>;

    /// Move every `QR Generated` unit of the item's batch to `Available`.
    ///
    /// Returns the units that changed. `NotFound` if the item has no batch.
    fn receive_units(&self, po_item_id: PoItemId) -> Result<Vec<StockUnit>, StoreError>;

    /// Replace the notes on an open reservation. `NotFound` if there is none.
    fn set_reservation_notes(
        &self,
        stock_id: StockId,
        notes: String,
    ) -> Result<Reservation, StoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn unit(&self, stock_id: StockId) -> Result<Option<StockUnit>, StoreError> {
        (**self).unit(stock_id)
    }

    fn unit_by_barcode(&self, barcode: &str) -> Result<Option<StockUnit>, StoreError> {
        (**self).unit_by_barcode(barcode)
    }

    fn unit_by_item_code(&self, item_code: &str) -> Result<Option<StockUnit>, StoreError> {
        (**self).unit_by_item_code(item_code)
    }

    fn units_in_batch(&self, batch_id: BatchId) -> Result<Vec<StockUnit>, StoreError> {
        (**self).units_in_batch(batch_id)
    }

    fn batch(&self, batch_id: BatchId) -> Result<Option<Batch>, StoreError> {
        (**self).batch(batch_id)
    }

    fn batch_for_po_item(&self, po_item_id: PoItemId) -> Result<Option<Batch>, StoreError> {
        (**self).batch_for_po_item(po_item_id)
    }

    fn reservation(&self, stock_id: StockId) -> Result<Option<Reservation>, StoreError> {
        (**self).reservation(stock_id)
    }

    fn movements(&self, stock_id: StockId) -> Result<Vec<MovementRecord>, StoreError> {
        (**self).movements(stock_id)
    }

    fn returns(&self) -> Result<Vec<ReturnEntry>, StoreError> {
        (**self).returns()
    }

    fn client_name(&self, client_id: ClientId) -> Result<Option<String>, StoreError> {
        (**self).client_name(client_id)
    }

    fn commit(&self, commit: TransitionCommit) -> Result<CommittedTransition, StoreError> {
        (**self).commit(commit)
    }

    fn register_batch(&self, batch: Batch, units: Vec<StockUnit>) -> Result<(), StoreError> {
        (**self).register_batch(batch, units)
    }

    fn receive_units(&self, po_item_id: PoItemId) -> Result<Vec<StockUnit>, StoreError> {
        (**self).receive_units(po_item_id)
    }

    fn set_reservation_notes(
        &self,
        stock_id: StockId,
        notes: String,
    ) -> Result<Reservation, StoreError> {
        (**self).set_reservation_notes(stock_id, notes)
    }
}
