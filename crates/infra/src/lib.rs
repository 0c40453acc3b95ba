//! Infrastructure layer: storage, ledger service, config.

pub mod config;
pub mod ledger;
pub mod lookup;
pub mod receiving;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use config::{DatabaseConfig, LedgerConfig};
pub use ledger::{Clock, ErrorKind, FixedClock, LedgerError, StockLedger, SystemClock, TransitionReceipt};
pub use receiving::{NewBatch, ReceivedBatch, RegisteredBatch, MAX_BATCH_QUANTITY};
pub use store::{
    CommittedTransition, InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, StoreError,
    TransitionCommit,
};
