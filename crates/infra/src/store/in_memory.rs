use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use slabledger_core::{AggregateRoot, BatchId, ClientId, PoItemId, StockId};
use slabledger_stock::codes::piece_number;
use slabledger_stock::{
    Batch, MovementRecord, Reservation, ReservationChange, ReturnEntry, StockUnit,
};

use super::r#trait::{CommittedTransition, LedgerStore, StoreError, TransitionCommit};

#[derive(Debug, Default)]
struct Tables {
    batches: HashMap<BatchId, Batch>,
    units: HashMap<StockId, StockUnit>,
    reservations: HashMap<StockId, Reservation>,
    movements: Vec<MovementRecord>,
    returns: Vec<ReturnEntry>,
    clients: HashMap<ClientId, String>,
}

/// In-memory ledger store.
///
/// Intended for tests/dev. A single mutex guards every table for the whole of
/// a commit, so commits are serialized and all-or-nothing.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    tables: Mutex<Tables>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the client directory the ledger reads names from.
    pub fn insert_client(
        &self,
        client_id: ClientId,
        name: impl Into<String>,
    ) -> Result<(), StoreError> {
        self.lock()?.clients.insert(client_id, name.into());
        Ok(())
    }

    /// Overwrite a unit row as-is, bypassing the ledger.
    #[cfg(test)]
    pub(crate) fn put_unit(&self, unit: StockUnit) -> Result<(), StoreError> {
        self.lock()?.units.insert(unit.id_typed(), unit);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn unit(&self, stock_id: StockId) -> Result<Option<StockUnit>, StoreError> {
        Ok(self.lock()?.units.get(&stock_id).cloned())
    }

    fn unit_by_barcode(&self, barcode: &str) -> Result<Option<StockUnit>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.units.values().find(|u| u.barcode() == barcode).cloned())
    }

    fn unit_by_item_code(&self, item_code: &str) -> Result<Option<StockUnit>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .units
            .values()
            .find(|u| u.item_code() == item_code)
            .cloned())
    }

    fn units_in_batch(&self, batch_id: BatchId) -> Result<Vec<StockUnit>, StoreError> {
        let tables = self.lock()?;
        let mut units: Vec<StockUnit> = tables
            .units
            .values()
            .filter(|u| u.batch_id() == batch_id)
            .cloned()
            .collect();
        units.sort_by_key(|u| piece_number(u.item_code()));
        Ok(units)
    }

    fn batch(&self, batch_id: BatchId) -> Result<Option<Batch>, StoreError> {
        Ok(self.lock()?.batches.get(&batch_id).cloned())
    }

    fn batch_for_po_item(&self, po_item_id: PoItemId) -> Result<Option<Batch>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .batches
            .values()
            .find(|b| b.po_item_id() == po_item_id)
            .cloned())
    }

    fn reservation(&self, stock_id: StockId) -> Result<Option<Reservation>, StoreError> {
        Ok(self.lock()?.reservations.get(&stock_id).cloned())
    }

    fn movements(&self, stock_id: StockId) -> Result<Vec<MovementRecord>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .movements
            .iter()
            .filter(|m| m.stock_id == stock_id)
            .cloned()
            .collect())
    }

    fn returns(&self) -> Result<Vec<ReturnEntry>, StoreError> {
        Ok(self.lock()?.returns.iter().rev().cloned().collect())
    }

    fn client_name(&self, client_id: ClientId) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.clients.get(&client_id).cloned())
    }

    fn commit(&self, commit: TransitionCommit) -> Result<CommittedTransition, StoreError> {
        let mut tables = self.lock()?;

        // Work on copies; tables are only written once every check has passed.
        let mut unit = tables
            .units
            .get(&commit.stock_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("stock unit {}", commit.stock_id)))?;

        if unit.status() != commit.expected_status {
            return Err(StoreError::Conflict(format!(
                "stock unit {} is {}, expected {}",
                unit.item_code(),
                unit.status(),
                commit.expected_status
            )));
        }
        commit.expected_version.check(unit.version())?;

        if unit.batch_id() != commit.batch_id {
            return Err(StoreError::InvariantViolation(format!(
                "stock unit {} does not belong to batch {}",
                unit.item_code(),
                commit.batch_id
            )));
        }
        let mut batch = tables
            .batches
            .get(&commit.batch_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("batch {}", commit.batch_id)))?;
        batch.apply_delta(commit.counters)?;

        unit.transition(commit.to, commit.assignment);

        let reservation = match commit.reservation {
            ReservationChange::Open => {
                if tables.reservations.contains_key(&commit.stock_id) {
                    return Err(StoreError::InvariantViolation(format!(
                        "stock unit {} already has a reservation",
                        unit.item_code()
                    )));
                }
                let assignment = unit.assignment().cloned().ok_or_else(|| {
                    StoreError::InvariantViolation(format!(
                        "cannot reserve stock unit {} without an assignment",
                        unit.item_code()
                    ))
                })?;
                Some(Reservation::open(
                    commit.stock_id,
                    assignment,
                    commit.movement.recorded_at,
                ))
            }
            ReservationChange::Close => None,
        };

        tables.units.insert(commit.stock_id, unit.clone());
        tables.batches.insert(commit.batch_id, batch.clone());
        match reservation {
            Some(r) => {
                tables.reservations.insert(commit.stock_id, r);
            }
            None => {
                tables.reservations.remove(&commit.stock_id);
            }
        }
        tables.movements.push(commit.movement.clone());
        if let Some(entry) = &commit.return_entry {
            tables.returns.push(entry.clone());
        }

        Ok(CommittedTransition {
            unit,
            batch,
            movement: commit.movement,
            return_entry: commit.return_entry,
        })
    }

    fn register_batch(&self, batch: Batch, units: Vec<StockUnit>) -> Result<(), StoreError> {
        let mut tables = self.lock()?;

        if tables.batches.contains_key(&batch.id_typed())
            || tables
                .batches
                .values()
                .any(|b| b.po_item_id() == batch.po_item_id())
        {
            return Err(StoreError::Conflict(format!(
                "purchase-order item {} already has a batch",
                batch.po_item_id()
            )));
        }

        let mut item_codes: HashSet<&str> =
            tables.units.values().map(|u| u.item_code()).collect();
        let mut barcodes: HashSet<&str> = tables.units.values().map(|u| u.barcode()).collect();
        for unit in &units {
            if unit.batch_id() != batch.id_typed() {
                return Err(StoreError::InvariantViolation(format!(
                    "stock unit {} does not belong to batch {}",
                    unit.item_code(),
                    batch.code()
                )));
            }
            if !item_codes.insert(unit.item_code()) {
                return Err(StoreError::Conflict(format!(
                    "item code {} is already taken",
                    unit.item_code()
                )));
            }
            if !barcodes.insert(unit.barcode()) {
                return Err(StoreError::Conflict(format!(
                    "barcode {} is already taken",
                    unit.barcode()
                )));
            }
        }
        drop(item_codes);
        drop(barcodes);

        for unit in units {
            tables.units.insert(unit.id_typed(), unit);
        }
        tables.batches.insert(batch.id_typed(), batch);
        Ok(())
    }

    fn receive_units(&self, po_item_id: PoItemId) -> Result<Vec<StockUnit>, StoreError> {
        let mut tables = self.lock()?;

        let batch_id = tables
            .batches
            .values()
            .find(|b| b.po_item_id() == po_item_id)
            .map(|b| b.id_typed())
            .ok_or_else(|| {
                StoreError::NotFound(format!("no batch for purchase-order item {po_item_id}"))
            })?;

        let mut received: Vec<StockUnit> = tables
            .units
            .values_mut()
            .filter(|u| u.batch_id() == batch_id)
            .filter_map(|u| u.receive().then(|| u.clone()))
            .collect();
        received.sort_by_key(|u| piece_number(u.item_code()));
        Ok(received)
    }

    fn set_reservation_notes(
        &self,
        stock_id: StockId,
        notes: String,
    ) -> Result<Reservation, StoreError> {
        let mut tables = self.lock()?;
        let reservation = tables
            .reservations
            .get_mut(&stock_id)
            .ok_or_else(|| StoreError::NotFound(format!("no reservation for stock unit {stock_id}")))?;
        reservation.notes = notes;
        Ok(reservation.clone())
    }
}
