//! Stock ledger service (application-level orchestration).
//!
//! Every transition follows the same pipeline:
//!
//! ```text
//! request
//!   ↓
//! 1. Load the unit from the store
//!   ↓
//! 2. Plan the transition (pure, `slabledger_stock::plan`)
//!   ↓
//! 3. Build the movement record and, for returns, the register snapshot
//!   ↓
//! 4. Submit one `TransitionCommit` guarded by expected status + version
//! ```
//!
//! The ledger holds no state of its own beyond the injected store and clock.
//! It never retries: a lost race surfaces as `LedgerError::Conflict`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use slabledger_core::{
    AggregateRoot, BatchId, ClientId, DomainError, ExpectedVersion, MovementId, ReturnId, StockId,
};
use slabledger_stock::{
    plan, Assignment, Batch, DeliveryMode, DeliveryOrderNo, LedgerOperation, MovementRecord,
    Reservation, ReturnEntry, ReturnPhase, StockUnit, UnitStatus,
};

use crate::store::{LedgerStore, StoreError, TransitionCommit};

/// Source of "now" for movement timestamps, scan dates and return dates.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant. Used by tests and replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Caller-facing error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    Conflict,
    Validation,
    InvariantViolation,
    Store,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Validation => "validation",
            ErrorKind::InvariantViolation => "invariant_violation",
            ErrorKind::Store => "store",
        }
    }
}

/// Why a ledger operation was rejected. Nothing was written in every case.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The unit's current status does not allow the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Clearing a unit that is not out. Nothing to do; reported as a notice.
    #[error("invalid state: {0}")]
    NothingToClear(String),

    /// The unit is already committed, or a concurrent transition won the race.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// Stored data breaks a ledger invariant; needs operator attention.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("store failure: {0}")]
    Store(StoreError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::InvalidState(_) | LedgerError::NothingToClear(_) => {
                ErrorKind::InvalidState
            }
            LedgerError::Conflict(_) => ErrorKind::Conflict,
            LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::InvariantViolation(_) => ErrorKind::InvariantViolation,
            LedgerError::Store(_) => ErrorKind::Store,
        }
    }

    /// Human-readable detail without the kind prefix.
    pub fn detail(&self) -> String {
        match self {
            LedgerError::NotFound(msg)
            | LedgerError::InvalidState(msg)
            | LedgerError::NothingToClear(msg)
            | LedgerError::Conflict(msg)
            | LedgerError::Validation(msg)
            | LedgerError::InvariantViolation(msg) => msg.clone(),
            LedgerError::Store(err) => err.to_string(),
        }
    }

    /// A benign "nothing to do" rejection: clearing a unit that is not out.
    pub fn is_informational(&self) -> bool {
        matches!(self, LedgerError::NothingToClear(_))
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                LedgerError::Validation(msg)
            }
            DomainError::InvariantViolation(msg) => LedgerError::InvariantViolation(msg),
            DomainError::NotFound(msg) => LedgerError::NotFound(msg),
            DomainError::InvalidState(msg) => LedgerError::InvalidState(msg),
            DomainError::Conflict(msg) => LedgerError::Conflict(msg),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => LedgerError::Conflict(msg),
            StoreError::NotFound(msg) => LedgerError::NotFound(msg),
            StoreError::InvariantViolation(msg) => LedgerError::InvariantViolation(msg),
            other @ StoreError::Backend(_) => LedgerError::Store(other),
        }
    }
}

/// Success receipt of one ledger transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionReceipt {
    pub operation: &'static str,
    pub from: UnitStatus,
    pub unit: StockUnit,
    pub batch: Batch,
    pub movement: MovementRecord,
    pub return_entry: Option<ReturnEntry>,
}

/// The stock ledger: the only writer of unit statuses, batch counters,
/// reservations, movements and the returns register.
#[derive(Debug)]
pub struct StockLedger<S, C = SystemClock> {
    pub(crate) store: S,
    pub(crate) clock: C,
}

impl<S> StockLedger<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: SystemClock,
        }
    }
}

impl<S, C> StockLedger<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

impl<S, C> StockLedger<S, C>
where
    S: LedgerStore,
    C: Clock,
{
    /// Dispatch an available unit to a client: `Available -> Out`.
    #[instrument(
        skip(self, delivery_order_no),
        fields(stock_id = %stock_id, client_id = %client_id, operation = "mark_out")
    )]
    pub fn mark_out(
        &self,
        stock_id: StockId,
        client_id: ClientId,
        delivery_order_no: &str,
        mode: DeliveryMode,
    ) -> Result<TransitionReceipt, LedgerError> {
        let delivery_order_no = DeliveryOrderNo::parse(delivery_order_no)
            .map_err(|e| rejected("mark_out", stock_id, e.into()))?;
        self.execute(
            stock_id,
            LedgerOperation::MarkOut {
                assignment: Assignment {
                    client_id,
                    delivery_order_no,
                },
                mode,
            },
        )
    }

    /// Confirm the sale and clear the reservation: `Out -> Sold`.
    #[instrument(skip(self), fields(stock_id = %stock_id, operation = "clear_sale"))]
    pub fn clear_sale(&self, stock_id: StockId) -> Result<TransitionReceipt, LedgerError> {
        self.execute(stock_id, LedgerOperation::ClearSale)
            .map_err(|err| match err {
                LedgerError::InvalidState(msg) => LedgerError::NothingToClear(msg),
                other => other,
            })
    }

    /// Take a unit back into stock: `Out -> Available` before invoicing,
    /// `Sold -> Available` after.
    #[instrument(skip(self, reason), fields(stock_id = %stock_id, phase = ?phase))]
    pub fn return_unit(
        &self,
        stock_id: StockId,
        reason: &str,
        phase: ReturnPhase,
    ) -> Result<TransitionReceipt, LedgerError> {
        self.execute(
            stock_id,
            LedgerOperation::Return {
                phase,
                reason: reason.to_string(),
            },
        )
    }

    /// Revert a confirmed sale: `Sold -> Out`, reservation restored.
    #[instrument(skip(self, reason), fields(stock_id = %stock_id, operation = "undo_sale"))]
    pub fn undo_sale(
        &self,
        stock_id: StockId,
        reason: &str,
    ) -> Result<TransitionReceipt, LedgerError> {
        self.execute(
            stock_id,
            LedgerOperation::UndoSale {
                reason: reason.to_string(),
            },
        )
    }

    /// Update the free-text notes of an open reservation.
    #[instrument(skip(self, notes), fields(stock_id = %stock_id))]
    pub fn annotate_reservation(
        &self,
        stock_id: StockId,
        notes: &str,
    ) -> Result<Reservation, LedgerError> {
        let reservation = self
            .store
            .set_reservation_notes(stock_id, notes.trim().to_string())?;
        info!("reservation notes updated");
        Ok(reservation)
    }

    /// Movement records of one unit, oldest first.
    pub fn history(&self, stock_id: StockId) -> Result<Vec<MovementRecord>, LedgerError> {
        self.load_unit(stock_id)?;
        Ok(self.store.movements(stock_id)?)
    }

    /// The returns register, newest first.
    pub fn returns(&self) -> Result<Vec<ReturnEntry>, LedgerError> {
        Ok(self.store.returns()?)
    }

    pub fn unit(&self, stock_id: StockId) -> Result<Option<StockUnit>, LedgerError> {
        Ok(self.store.unit(stock_id)?)
    }

    pub fn batch(&self, batch_id: BatchId) -> Result<Option<Batch>, LedgerError> {
        Ok(self.store.batch(batch_id)?)
    }

    pub fn reservation(&self, stock_id: StockId) -> Result<Option<Reservation>, LedgerError> {
        Ok(self.store.reservation(stock_id)?)
    }

    fn load_unit(&self, stock_id: StockId) -> Result<StockUnit, LedgerError> {
        self.store
            .unit(stock_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("stock unit {stock_id}")))
    }

    fn execute(
        &self,
        stock_id: StockId,
        operation: LedgerOperation,
    ) -> Result<TransitionReceipt, LedgerError> {
        let name = operation.name();
        self.try_execute(stock_id, operation)
            .map_err(|e| rejected(name, stock_id, e))
    }

    fn try_execute(
        &self,
        stock_id: StockId,
        operation: LedgerOperation,
    ) -> Result<TransitionReceipt, LedgerError> {
        let unit = self.load_unit(stock_id)?;
        let transition = plan(&unit, &operation)?;

        let now = self.clock.now();
        let today = now.date_naive();

        let return_entry = match transition.return_phase {
            Some(phase) => {
                let client_name = match unit.assignment() {
                    Some(a) => self.store.client_name(a.client_id)?,
                    None => None,
                };
                Some(ReturnEntry::snapshot(
                    ReturnId::new(),
                    &unit,
                    phase,
                    transition.reason.as_deref().unwrap_or_default(),
                    client_name,
                    today,
                ))
            }
            None => None,
        };

        let logged = transition.logged_assignment.as_ref();
        let movement = MovementRecord {
            movement_id: MovementId::new(),
            stock_id,
            kind: transition.movement_kind,
            client_id: logged.map(|a| a.client_id),
            delivery_order_no: logged.map(|a| a.delivery_order_no.clone()),
            scan_date: today,
            recorded_at: now,
            delivery_mode: transition.delivery_mode,
            reason: transition.reason.clone(),
        };

        let committed = self.store.commit(TransitionCommit {
            stock_id,
            batch_id: unit.batch_id(),
            expected_status: transition.from,
            expected_version: ExpectedVersion::Exact(unit.version()),
            to: transition.to,
            assignment: transition.assignment,
            counters: transition.counters,
            reservation: transition.reservation,
            movement,
            return_entry,
        })?;

        let batch = &committed.batch;
        info!(
            operation = operation.name(),
            item_code = committed.unit.item_code(),
            from = %transition.from,
            to = %transition.to,
            batch_code = batch.code(),
            out = batch.out(),
            sold = batch.sold(),
            returned = batch.returned(),
            available = batch.available(),
            "stock unit transitioned"
        );

        Ok(TransitionReceipt {
            operation: operation.name(),
            from: transition.from,
            unit: committed.unit,
            batch: committed.batch,
            movement: committed.movement,
            return_entry: committed.return_entry,
        })
    }
}

fn rejected(operation: &str, stock_id: StockId, err: LedgerError) -> LedgerError {
    warn!(
        operation,
        stock_id = %stock_id,
        kind = err.kind().as_str(),
        detail = %err.detail(),
        "ledger operation rejected"
    );
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use slabledger_core::PoItemId;
    use slabledger_stock::{CounterDelta, MovementKind, ProductLine, UnitDetails};

    use crate::receiving::NewBatch;
    use crate::store::InMemoryLedgerStore;

    fn fixed_clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2026, 4, 2, 9, 30, 0).unwrap())
    }

    fn new_batch(quantity: i64) -> NewBatch {
        NewBatch {
            po_item_id: PoItemId::new(),
            product_line: ProductLine::Granite,
            invoice_no: "inv42".to_string(),
            line_index: 1,
            quantity,
            product_name: "Black Galaxy".to_string(),
            category: "Granite".to_string(),
            width: Some("60".to_string()),
            thickness: Some("2".to_string()),
            height: Some("120".to_string()),
            colour: Some("Black".to_string()),
        }
    }

    struct Fixture {
        ledger: StockLedger<InMemoryLedgerStore, FixedClock>,
        client_id: ClientId,
        batch_id: BatchId,
        units: Vec<StockId>,
    }

    /// A received batch of `quantity` available units and one known client.
    fn fixture(quantity: i64) -> Fixture {
        let ledger = StockLedger::with_clock(InMemoryLedgerStore::new(), fixed_clock());
        let client_id = ClientId::new();
        ledger
            .store()
            .insert_client(client_id, "Hillside Memorials")
            .unwrap();
        let new = new_batch(quantity);
        let po_item_id = new.po_item_id;
        let registered = ledger.register_batch(new).unwrap();
        ledger.receive_batch(po_item_id).unwrap();
        Fixture {
            ledger,
            client_id,
            batch_id: registered.batch.id_typed(),
            units: registered.units.iter().map(|u| u.id_typed()).collect(),
        }
    }

    impl Fixture {
        fn mark_out(&self, idx: usize) -> Result<TransitionReceipt, LedgerError> {
            self.ledger
                .mark_out(self.units[idx], self.client_id, "DO-100", DeliveryMode::Scan)
        }

        fn batch(&self) -> Batch {
            self.ledger.batch(self.batch_id).unwrap().unwrap()
        }

        fn status(&self, idx: usize) -> UnitStatus {
            self.ledger.unit(self.units[idx]).unwrap().unwrap().status()
        }
    }

    #[test]
    fn scenario_mark_out_then_sell() {
        let f = fixture(10);

        let out = f.mark_out(0).unwrap();
        assert_eq!(out.from, UnitStatus::Available);
        assert_eq!(out.unit.status(), UnitStatus::Out);
        assert_eq!(out.batch.out(), 1);
        assert_eq!(out.batch.available(), 9);
        let reservation = f.ledger.reservation(f.units[0]).unwrap().unwrap();
        assert_eq!(reservation.assignment.client_id, f.client_id);
        assert_eq!(reservation.assignment.delivery_order_no.as_str(), "DO-100");

        let sold = f.ledger.clear_sale(f.units[0]).unwrap();
        assert_eq!(sold.unit.status(), UnitStatus::Sold);
        assert_eq!(sold.batch.out(), 0);
        assert_eq!(sold.batch.sold(), 1);
        assert_eq!(sold.batch.available(), 9);
        assert!(f.ledger.reservation(f.units[0]).unwrap().is_none());
        assert_eq!(sold.unit.assignment().map(|a| a.client_id), Some(f.client_id));

        let history = f.ledger.history(f.units[0]).unwrap();
        let kinds: Vec<MovementKind> = history.iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![MovementKind::Out, MovementKind::Sold]);
        assert_eq!(history[1].delivery_mode, Some(DeliveryMode::ReservedClear));
        assert_eq!(history[0].scan_date, fixed_clock().today());
    }

    #[test]
    fn scenario_return_before_invoice() {
        let f = fixture(10);
        f.mark_out(0).unwrap();

        let receipt = f
            .ledger
            .return_unit(f.units[0], "chipped corner", ReturnPhase::Before)
            .unwrap();
        assert_eq!(receipt.unit.status(), UnitStatus::Available);
        assert_eq!(receipt.unit.assignment(), None);
        assert_eq!(receipt.batch.out(), 0);
        assert_eq!(receipt.batch.returned(), 1);
        assert_eq!(receipt.batch.available(), 10);
        assert!(f.ledger.reservation(f.units[0]).unwrap().is_none());

        let entry = receipt.return_entry.unwrap();
        assert_eq!(entry.reason, "chipped corner | Return Before Invoice");
        assert_eq!(entry.client_name, "Hillside Memorials");
        assert_eq!(entry.colour, "Black");
        assert_eq!(entry.batch_code, "GR-INV42-I1");
        assert_eq!(entry.item_codes, vec!["GR-INV42-I1/1".to_string()]);
        assert_eq!(entry.return_date, fixed_clock().today());
        assert_eq!(f.ledger.returns().unwrap(), vec![entry]);
    }

    #[test]
    fn scenario_return_after_sale() {
        let f = fixture(10);
        f.mark_out(0).unwrap();
        f.ledger.clear_sale(f.units[0]).unwrap();

        let receipt = f
            .ledger
            .return_unit(f.units[0], "wrong colour", ReturnPhase::After)
            .unwrap();
        assert_eq!(receipt.unit.status(), UnitStatus::Available);
        assert_eq!(receipt.unit.assignment(), None);
        assert_eq!(receipt.batch.sold(), 0);
        assert_eq!(receipt.batch.returned(), 1);
        assert_eq!(receipt.batch.available(), 10);
        assert_eq!(receipt.movement.kind, MovementKind::ReturnAfterSale);
        assert_eq!(receipt.movement.reason.as_deref(), Some("wrong colour"));
        assert_eq!(
            receipt.return_entry.unwrap().reason,
            "wrong colour | Return After Sale"
        );
    }

    #[test]
    fn scenario_undo_sale() {
        let f = fixture(10);
        f.mark_out(0).unwrap();
        let sold = f.ledger.clear_sale(f.units[0]).unwrap();
        let available_before = sold.batch.available();

        let receipt = f.ledger.undo_sale(f.units[0], "invoice voided").unwrap();
        assert_eq!(receipt.unit.status(), UnitStatus::Out);
        assert_eq!(receipt.batch.out(), 1);
        assert_eq!(receipt.batch.sold(), 0);
        assert_eq!(receipt.batch.available(), available_before);

        let reservation = f.ledger.reservation(f.units[0]).unwrap().unwrap();
        assert_eq!(reservation.assignment.client_id, f.client_id);
        assert_eq!(reservation.assignment.delivery_order_no.as_str(), "DO-100");
        assert_eq!(receipt.movement.kind, MovementKind::UndoSale);
        assert_eq!(receipt.movement.client_id, Some(f.client_id));
    }

    #[test]
    fn return_before_invoice_is_the_inverse_of_mark_out() {
        let f = fixture(3);
        let before = f.batch();

        f.mark_out(1).unwrap();
        f.ledger
            .return_unit(f.units[1], "", ReturnPhase::Before)
            .unwrap();

        let after = f.batch();
        assert_eq!(f.status(1), UnitStatus::Available);
        assert_eq!(after.out(), before.out());
        assert_eq!(after.sold(), before.sold());
        assert_eq!(after.available(), before.available());
        assert_eq!(after.returned(), before.returned() + 1);
        assert!(f.ledger.reservation(f.units[1]).unwrap().is_none());
    }

    #[test]
    fn clear_sale_twice_is_informational_the_second_time() {
        let f = fixture(2);
        f.mark_out(0).unwrap();
        f.ledger.clear_sale(f.units[0]).unwrap();
        let counters = f.batch().counters();

        let err = f.ledger.clear_sale(f.units[0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(err.is_informational());
        assert!(err.detail().contains("cannot clear reservation"));
        assert_eq!(f.batch().counters(), counters);
        assert_eq!(f.ledger.history(f.units[0]).unwrap().len(), 2);
    }

    #[test]
    fn mark_out_of_committed_unit_is_a_conflict() {
        let f = fixture(2);
        f.mark_out(0).unwrap();
        let err = f.mark_out(0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(f.batch().out(), 1);

        f.ledger.clear_sale(f.units[0]).unwrap();
        let counters = f.batch().counters();
        assert_eq!(f.mark_out(0).unwrap_err().kind(), ErrorKind::Conflict);
        assert_eq!(f.batch().counters(), counters);
        assert_eq!(f.status(0), UnitStatus::Sold);
        assert_eq!(f.ledger.history(f.units[0]).unwrap().len(), 2);
    }

    #[test]
    fn only_clearing_a_unit_that_is_not_out_is_informational() {
        let f = fixture(1);
        let clear = f.ledger.clear_sale(f.units[0]).unwrap_err();
        assert!(clear.is_informational());

        let undo = f.ledger.undo_sale(f.units[0], "typo").unwrap_err();
        assert_eq!(undo.kind(), ErrorKind::InvalidState);
        assert!(!undo.is_informational());

        let wrong_phase = f
            .ledger
            .return_unit(f.units[0], "damaged", ReturnPhase::After)
            .unwrap_err();
        assert_eq!(wrong_phase.kind(), ErrorKind::InvalidState);
        assert!(!wrong_phase.is_informational());
    }

    #[test]
    fn mark_out_requires_delivery_order_number() {
        let f = fixture(1);
        let err = f
            .ledger
            .mark_out(f.units[0], f.client_id, "   ", DeliveryMode::SingleScan)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(f.status(0), UnitStatus::Available);
        assert!(f.ledger.history(f.units[0]).unwrap().is_empty());
    }

    #[test]
    fn mark_out_before_receipt_is_invalid_state() {
        let ledger = StockLedger::with_clock(InMemoryLedgerStore::new(), fixed_clock());
        let registered = ledger.register_batch(new_batch(1)).unwrap();
        let stock_id = registered.units[0].id_typed();

        let err = ledger
            .mark_out(stock_id, ClientId::new(), "DO-1", DeliveryMode::Scan)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(ledger.batch(registered.batch.id_typed()).unwrap().unwrap().out(), 0);
    }

    #[test]
    fn unknown_unit_is_not_found() {
        let f = fixture(1);
        let missing = StockId::new();
        assert_eq!(f.ledger.clear_sale(missing).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            f.ledger
                .mark_out(missing, f.client_id, "DO-1", DeliveryMode::Scan)
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(f.ledger.history(missing).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn returns_require_matching_phase() {
        let f = fixture(2);
        f.mark_out(0).unwrap();
        let err = f
            .ledger
            .return_unit(f.units[0], "x", ReturnPhase::After)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let err = f
            .ledger
            .return_unit(f.units[1], "x", ReturnPhase::Before)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(f.ledger.returns().unwrap().is_empty());
    }

    #[test]
    fn undo_sale_without_stored_assignment_is_an_invariant_violation() {
        let f = fixture(1);
        let unit = f.ledger.unit(f.units[0]).unwrap().unwrap();
        f.ledger
            .store()
            .put_unit(StockUnit::restore(
                unit.id_typed(),
                unit.batch_id(),
                unit.po_item_id(),
                unit.item_code().to_string(),
                unit.barcode().to_string(),
                unit.batch_code().to_string(),
                unit.details().clone(),
                UnitStatus::Sold,
                None,
                unit.version(),
            ))
            .unwrap();

        let err = f.ledger.undo_sale(f.units[0], "voided").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert!(f.ledger.reservation(f.units[0]).unwrap().is_none());
    }

    #[test]
    fn legacy_returned_units_can_be_dispatched() {
        let f = fixture(1);
        let unit = f.ledger.unit(f.units[0]).unwrap().unwrap();
        f.ledger
            .store()
            .put_unit(StockUnit::restore(
                unit.id_typed(),
                unit.batch_id(),
                unit.po_item_id(),
                unit.item_code().to_string(),
                unit.barcode().to_string(),
                unit.batch_code().to_string(),
                UnitDetails {
                    colour: None,
                    ..unit.details().clone()
                },
                UnitStatus::Returned,
                None,
                unit.version(),
            ))
            .unwrap();

        let receipt = f.mark_out(0).unwrap();
        assert_eq!(receipt.from, UnitStatus::Returned);
        assert_eq!(receipt.unit.status(), UnitStatus::Out);
    }

    #[test]
    fn stale_commit_is_rejected_without_side_effects() {
        let f = fixture(2);
        let unit = f.ledger.unit(f.units[0]).unwrap().unwrap();
        f.mark_out(0).unwrap();
        let counters = f.batch().counters();

        let err = f
            .ledger
            .store()
            .commit(TransitionCommit {
                stock_id: unit.id_typed(),
                batch_id: unit.batch_id(),
                expected_status: UnitStatus::Available,
                expected_version: ExpectedVersion::Exact(unit.version()),
                to: UnitStatus::Out,
                assignment: slabledger_stock::AssignmentChange::Keep,
                counters: CounterDelta::MARK_OUT,
                reservation: slabledger_stock::ReservationChange::Close,
                movement: MovementRecord {
                    movement_id: MovementId::new(),
                    stock_id: unit.id_typed(),
                    kind: MovementKind::Out,
                    client_id: None,
                    delivery_order_no: None,
                    scan_date: fixed_clock().today(),
                    recorded_at: fixed_clock().now(),
                    delivery_mode: None,
                    reason: None,
                },
                return_entry: None,
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(f.batch().counters(), counters);
        assert_eq!(f.ledger.history(f.units[0]).unwrap().len(), 1);
    }

    #[test]
    fn reservation_notes_can_be_annotated_while_out() {
        let f = fixture(1);
        let err = f.ledger.annotate_reservation(f.units[0], "call first").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        f.mark_out(0).unwrap();
        let reservation = f
            .ledger
            .annotate_reservation(f.units[0], " deliver to rear gate ")
            .unwrap();
        assert_eq!(reservation.notes, "deliver to rear gate");
        assert_eq!(f.batch().out(), 1);
        assert_eq!(f.ledger.history(f.units[0]).unwrap().len(), 1);
    }

    #[test]
    fn store_errors_map_to_caller_kinds() {
        assert_eq!(
            LedgerError::from(StoreError::Backend("down".into())).kind(),
            ErrorKind::Store
        );
        assert_eq!(
            LedgerError::from(StoreError::Conflict("race".into())).kind(),
            ErrorKind::Conflict
        );
        let err = LedgerError::from(DomainError::invalid_state("not out"));
        assert_eq!(err.detail(), "not out");
        assert_eq!(err.to_string(), "invalid state: not out");
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig {
            cases: 64,
            ..proptest::prelude::ProptestConfig::default()
        })]

        /// Property: after any sequence of ledger operations, batch counters
        /// match the unit statuses and a reservation exists iff the unit is Out.
        #[test]
        fn ledger_state_stays_consistent(
            ops in proptest::collection::vec((0usize..5, 0usize..3), 0..40)
        ) {
            let f = fixture(3);
            for (op, idx) in ops {
                let stock_id = f.units[idx];
                let _ = match op {
                    0 => f.mark_out(idx),
                    1 => f.ledger.clear_sale(stock_id),
                    2 => f.ledger.return_unit(stock_id, "r", ReturnPhase::Before),
                    3 => f.ledger.return_unit(stock_id, "r", ReturnPhase::After),
                    _ => f.ledger.undo_sale(stock_id, "u"),
                };
            }

            let batch = f.batch();
            let mut out = 0;
            let mut sold = 0;
            for (idx, stock_id) in f.units.iter().enumerate() {
                let status = f.status(idx);
                let reserved = f.ledger.reservation(*stock_id).unwrap().is_some();
                proptest::prop_assert_eq!(reserved, status == UnitStatus::Out);
                match status {
                    UnitStatus::Out => out += 1,
                    UnitStatus::Sold => sold += 1,
                    _ => {}
                }
            }
            proptest::prop_assert_eq!(batch.out(), out);
            proptest::prop_assert_eq!(batch.sold(), sold);
            proptest::prop_assert_eq!(batch.available(), batch.quantity() - out - sold);
            proptest::prop_assert!(batch.available() >= 0);
        }
    }
}
