//! Batch registration and receiving: the entry edge into the ledger.
//!
//! Registration creates a batch and its units in `QR Generated` with printed
//! codes. Receiving moves those units to `Available` once the goods arrive.

use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use slabledger_core::{BatchId, PoItemId, StockId};
use slabledger_stock::codes::{self, BARCODE_ALPHABET, BARCODE_LEN};
use slabledger_stock::{Batch, ProductLine, StockUnit, UnitDetails};

use crate::ledger::{Clock, LedgerError, StockLedger};
use crate::store::LedgerStore;

/// Attempts per unit before giving up on finding an unused barcode.
const BARCODE_ATTEMPTS: usize = 16;

/// Largest number of units a single purchase-order line may register.
pub const MAX_BATCH_QUANTITY: i64 = 10_000;

/// A purchase-order line to register as a new batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBatch {
    pub po_item_id: PoItemId,
    pub product_line: ProductLine,
    pub invoice_no: String,
    /// 1-based position of the line within its purchase order.
    pub line_index: u32,
    pub quantity: i64,
    pub product_name: String,
    pub category: String,
    pub width: Option<String>,
    pub thickness: Option<String>,
    pub height: Option<String>,
    pub colour: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredBatch {
    pub batch: Batch,
    pub units: Vec<StockUnit>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedBatch {
    pub batch: Batch,
    /// Units that moved from `QR Generated` to `Available` in this call.
    pub received: Vec<StockUnit>,
}

impl ReceivedBatch {
    pub fn received_count(&self) -> usize {
        self.received.len()
    }
}

/// Draw one short barcode from `[A-Z0-9]`.
pub fn random_barcode<R: Rng>(rng: &mut R) -> String {
    (0..BARCODE_LEN)
        .map(|_| BARCODE_ALPHABET[rng.gen_range(0..BARCODE_ALPHABET.len())] as char)
        .collect()
}

impl<S, C> StockLedger<S, C>
where
    S: LedgerStore,
    C: Clock,
{
    /// Create a batch and its units for one purchase-order item.
    #[instrument(
        skip(self, new),
        fields(po_item_id = %new.po_item_id, quantity = new.quantity)
    )]
    pub fn register_batch(&self, new: NewBatch) -> Result<RegisteredBatch, LedgerError> {
        let result = self.try_register_batch(new);
        if let Err(err) = &result {
            warn!(kind = err.kind().as_str(), detail = %err.detail(), "batch registration rejected");
        }
        result
    }

    fn try_register_batch(&self, new: NewBatch) -> Result<RegisteredBatch, LedgerError> {
        if new.invoice_no.trim().is_empty() {
            return Err(LedgerError::Validation(
                "invoice number is required to build the batch code".to_string(),
            ));
        }
        if new.quantity > MAX_BATCH_QUANTITY {
            return Err(LedgerError::Validation(format!(
                "batch quantity {} exceeds the limit of {MAX_BATCH_QUANTITY}",
                new.quantity
            )));
        }
        let capacity = usize::try_from(new.quantity).map_err(|_| {
            LedgerError::Validation("batch quantity must be positive".to_string())
        })?;
        if self.store.batch_for_po_item(new.po_item_id)?.is_some() {
            return Err(LedgerError::Conflict(format!(
                "purchase-order item {} already has a batch",
                new.po_item_id
            )));
        }

        let batch_code = codes::batch_code(new.product_line, &new.invoice_no, new.line_index);
        let batch = Batch::new(
            BatchId::new(),
            new.po_item_id,
            batch_code.clone(),
            new.quantity,
            self.clock.today(),
        )?;

        let details = UnitDetails {
            product_name: match new.product_name.trim() {
                "" => batch_code.clone(),
                name => name.to_string(),
            },
            size: codes::size_label(
                new.width.as_deref(),
                new.thickness.as_deref(),
                new.height.as_deref(),
            ),
            category: new.category.trim().to_string(),
            colour: new
                .colour
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        };

        let mut rng = rand::thread_rng();
        let mut taken = HashSet::new();
        let mut units = Vec::with_capacity(capacity);
        for piece in 1..=new.quantity {
            let barcode = self.unused_barcode(&mut rng, &mut taken)?;
            units.push(StockUnit::generated(
                StockId::new(),
                batch.id_typed(),
                new.po_item_id,
                codes::item_code(&batch_code, piece),
                barcode,
                batch_code.clone(),
                details.clone(),
            ));
        }

        self.store.register_batch(batch.clone(), units.clone())?;
        info!(
            batch_code = batch.code(),
            units = units.len(),
            "batch registered"
        );
        Ok(RegisteredBatch { batch, units })
    }

    fn unused_barcode<R: Rng>(
        &self,
        rng: &mut R,
        taken: &mut HashSet<String>,
    ) -> Result<String, LedgerError> {
        for _ in 0..BARCODE_ATTEMPTS {
            let candidate = random_barcode(rng);
            if taken.contains(&candidate) || self.store.unit_by_barcode(&candidate)?.is_some() {
                continue;
            }
            taken.insert(candidate.clone());
            return Ok(candidate);
        }
        Err(LedgerError::Conflict(
            "could not find an unused barcode".to_string(),
        ))
    }

    /// Mark the goods of a purchase-order item as arrived.
    ///
    /// Only `QR Generated` units change. Calling it again reports zero.
    #[instrument(skip(self), fields(po_item_id = %po_item_id))]
    pub fn receive_batch(&self, po_item_id: PoItemId) -> Result<ReceivedBatch, LedgerError> {
        let result = self.try_receive_batch(po_item_id);
        match &result {
            Ok(r) => info!(
                batch_code = r.batch.code(),
                received = r.received_count(),
                "batch received"
            ),
            Err(err) => {
                warn!(kind = err.kind().as_str(), detail = %err.detail(), "batch receipt rejected")
            }
        }
        result
    }

    fn try_receive_batch(&self, po_item_id: PoItemId) -> Result<ReceivedBatch, LedgerError> {
        let received = self.store.receive_units(po_item_id)?;
        let batch = self.store.batch_for_po_item(po_item_id)?.ok_or_else(|| {
            LedgerError::NotFound(format!("no batch for purchase-order item {po_item_id}"))
        })?;
        Ok(ReceivedBatch { batch, received })
    }
}
