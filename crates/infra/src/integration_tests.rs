//! Concurrency tests for the ledger over a shared store.
//!
//! Verifies:
//! - Transitions on distinct units of one batch all land and the counters add up
//! - Exactly one of several racing transitions on the same unit wins
//! - Losers of a race change nothing

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use slabledger_core::{ClientId, PoItemId, StockId};
    use slabledger_stock::{DeliveryMode, MovementKind, ProductLine, ReturnPhase, UnitStatus};

    use crate::ledger::{ErrorKind, LedgerError, StockLedger, TransitionReceipt};
    use crate::receiving::NewBatch;
    use crate::store::{InMemoryLedgerStore, LedgerStore};

    type SharedLedger = Arc<StockLedger<Arc<InMemoryLedgerStore>>>;

    fn setup(quantity: i64) -> (SharedLedger, ClientId, Vec<StockId>) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let client_id = ClientId::new();
        store.insert_client(client_id, "Riverside Stone").unwrap();

        let ledger = StockLedger::new(store);
        let po_item_id = PoItemId::new();
        let registered = ledger
            .register_batch(NewBatch {
                po_item_id,
                product_line: ProductLine::Monuments,
                invoice_no: "inv-300".to_string(),
                line_index: 1,
                quantity,
                product_name: "Kerb Set".to_string(),
                category: "Monuments".to_string(),
                width: Some("90".to_string()),
                thickness: Some("5".to_string()),
                height: None,
                colour: None,
            })
            .unwrap();
        ledger.receive_batch(po_item_id).unwrap();

        let units = registered.units.iter().map(|u| u.id_typed()).collect();
        (Arc::new(ledger), client_id, units)
    }

    /// Run `f` on `threads` threads released at the same instant.
    fn race<F>(threads: usize, f: F) -> Vec<Result<TransitionReceipt, LedgerError>>
    where
        F: Fn(usize) -> Result<TransitionReceipt, LedgerError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let f = f.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    f(i)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn distinct_units_of_one_batch_are_all_dispatched() {
        let (ledger, client_id, units) = setup(2);
        let batch_id = ledger.unit(units[0]).unwrap().unwrap().batch_id();

        let l = ledger.clone();
        let u = units.clone();
        let results = race(2, move |i| {
            l.mark_out(u[i], client_id, &format!("DO-{i}"), DeliveryMode::Scan)
        });
        assert!(results.iter().all(|r| r.is_ok()));

        let batch = ledger.batch(batch_id).unwrap().unwrap();
        assert_eq!(batch.out(), 2);
        assert_eq!(batch.available(), 0);
        for id in &units {
            assert_eq!(ledger.unit(*id).unwrap().unwrap().status(), UnitStatus::Out);
            assert!(ledger.reservation(*id).unwrap().is_some());
        }
    }

    #[test]
    fn racing_mark_outs_on_one_unit_have_a_single_winner() {
        let (ledger, client_id, units) = setup(3);
        let target = units[1];

        let l = ledger.clone();
        let results = race(8, move |i| {
            l.mark_out(target, client_id, &format!("DO-{i}"), DeliveryMode::SingleScan)
        });

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(err.kind(), ErrorKind::Conflict);
        }

        let unit = ledger.unit(target).unwrap().unwrap();
        assert_eq!(
            unit.assignment(),
            winners[0].unit.assignment(),
            "stored assignment belongs to the winner"
        );
        let batch = winners[0].batch.clone();
        let stored = ledger.batch(batch.id_typed()).unwrap().unwrap();
        assert_eq!(stored.out(), 1);
        assert_eq!(stored.available(), 2);

        let history = ledger.history(target).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, MovementKind::Out);
    }

    #[test]
    fn racing_clear_and_return_on_one_unit_have_a_single_winner() {
        let (ledger, client_id, units) = setup(1);
        let target = units[0];
        ledger
            .mark_out(target, client_id, "DO-1", DeliveryMode::Scan)
            .unwrap();

        let l = ledger.clone();
        let results = race(6, move |i| {
            if i % 2 == 0 {
                l.clear_sale(target)
            } else {
                l.return_unit(target, "wrong colour", ReturnPhase::Before)
            }
        });

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(
                err.kind(),
                ErrorKind::Conflict | ErrorKind::InvalidState
            ));
        }

        let stored = ledger.batch(winners[0].batch.id_typed()).unwrap().unwrap();
        assert_eq!(stored.out(), 0);
        assert_eq!(stored.sold() + stored.available(), 1);
        assert!(ledger.reservation(target).unwrap().is_none());
        assert_eq!(ledger.history(target).unwrap().len(), 2);
    }

    #[test]
    fn ledger_works_over_a_trait_object_store() {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedgerStore::new());
        let ledger = StockLedger::new(store);
        let err = ledger.clear_sale(StockId::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(ledger.returns().unwrap().is_empty());
    }
}
