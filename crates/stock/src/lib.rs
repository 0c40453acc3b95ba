//! Stock domain module.
//!
//! This crate contains the business rules of the stock ledger (batches, units,
//! reservations, movements, returns and the transition table), implemented
//! purely as deterministic domain logic (no IO, no storage).

pub mod batch;
pub mod codes;
pub mod movement;
pub mod reservation;
pub mod returns;
pub mod status;
pub mod transition;
pub mod unit;

pub use batch::{Batch, BatchCounters, CounterDelta};
pub use codes::ProductLine;
pub use movement::{DeliveryMode, MovementKind, MovementRecord};
pub use reservation::{Reservation, ReservationChange};
pub use returns::{ReturnEntry, ReturnPhase};
pub use status::UnitStatus;
pub use transition::{plan, LedgerOperation, Transition};
pub use unit::{Assignment, AssignmentChange, DeliveryOrderNo, StockUnit, UnitDetails};
