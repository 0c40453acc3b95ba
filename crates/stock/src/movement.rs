use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use slabledger_core::{ClientId, Entity, MovementId, StockId};

use crate::unit::DeliveryOrderNo;

/// Kind of ledger transition a movement record captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementKind {
    Out,
    Sold,
    #[serde(rename = "Return Before Invoice")]
    ReturnBeforeInvoice,
    #[serde(rename = "Return After Sale")]
    ReturnAfterSale,
    #[serde(rename = "Undo Sale")]
    UndoSale,
}

impl MovementKind {
    pub const ALL: [MovementKind; 5] = [
        MovementKind::Out,
        MovementKind::Sold,
        MovementKind::ReturnBeforeInvoice,
        MovementKind::ReturnAfterSale,
        MovementKind::UndoSale,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::Out => "Out",
            MovementKind::Sold => "Sold",
            MovementKind::ReturnBeforeInvoice => "Return Before Invoice",
            MovementKind::ReturnAfterSale => "Return After Sale",
            MovementKind::UndoSale => "Undo Sale",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == label)
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a unit left the yard (or how a sale was confirmed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeliveryMode {
    #[default]
    Scan,
    #[serde(rename = "Single Scan")]
    SingleScan,
    #[serde(rename = "Bulk Scan")]
    BulkScan,
    #[serde(rename = "Reserved Clear")]
    ReservedClear,
}

impl DeliveryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryMode::Scan => "Scan",
            DeliveryMode::SingleScan => "Single Scan",
            DeliveryMode::BulkScan => "Bulk Scan",
            DeliveryMode::ReservedClear => "Reserved Clear",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        [
            DeliveryMode::Scan,
            DeliveryMode::SingleScan,
            DeliveryMode::BulkScan,
            DeliveryMode::ReservedClear,
        ]
        .into_iter()
        .find(|m| m.as_str() == label)
    }
}

/// Append-only audit entry for one ledger transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub movement_id: MovementId,
    pub stock_id: StockId,
    pub kind: MovementKind,
    pub client_id: Option<ClientId>,
    pub delivery_order_no: Option<DeliveryOrderNo>,
    pub scan_date: NaiveDate,
    pub recorded_at: DateTime<Utc>,
    pub delivery_mode: Option<DeliveryMode>,
    /// Free-text reason for returns and undos.
    pub reason: Option<String>,
}

impl Entity for MovementRecord {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.movement_id
    }
}
