//! Scanner lookup: resolve a scanned label to its stock unit.

use tracing::{debug, instrument};

use slabledger_stock::StockUnit;
use slabledger_stock::codes::normalize_scan;

use crate::ledger::{Clock, LedgerError, StockLedger};
use crate::store::LedgerStore;

impl<S, C> StockLedger<S, C>
where
    S: LedgerStore,
    C: Clock,
{
    /// Match a scanned code against the short barcode first, then the item code.
    ///
    /// Input is trimmed and upper-cased. No match is `Ok(None)`.
    #[instrument(skip(self))]
    pub fn lookup(&self, code: &str) -> Result<Option<StockUnit>, LedgerError> {
        let code = normalize_scan(code);
        if code.is_empty() {
            return Ok(None);
        }
        if let Some(unit) = self.store.unit_by_barcode(&code)? {
            debug!(item_code = unit.item_code(), "matched short barcode");
            return Ok(Some(unit));
        }
        let unit = self.store.unit_by_item_code(&code)?;
        if let Some(unit) = &unit {
            debug!(item_code = unit.item_code(), "matched item code");
        }
        Ok(unit)
    }
}
