//! Ledger storage boundary.
//!
//! The ledger owns no storage. It reads units, batches and reservations through
//! `LedgerStore` and hands each transition back as one `TransitionCommit`.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use r#trait::{CommittedTransition, LedgerStore, StoreError, TransitionCommit};
