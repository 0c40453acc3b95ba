use serde::{Deserialize, Serialize};

/// Lifecycle status of a stock unit.
///
/// `QrGenerated` is the pre-ledger state a unit sits in between batch
/// registration and receipt. `Returned` is never produced by a ledger transition
/// (returns put the unit back to `Available`) but may still appear on legacy rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitStatus {
    #[serde(rename = "QR Generated")]
    QrGenerated,
    Available,
    Out,
    Sold,
    Returned,
}

impl UnitStatus {
    pub const ALL: [UnitStatus; 5] = [
        UnitStatus::QrGenerated,
        UnitStatus::Available,
        UnitStatus::Out,
        UnitStatus::Sold,
        UnitStatus::Returned,
    ];

    /// Stable label used in storage and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            UnitStatus::QrGenerated => "QR Generated",
            UnitStatus::Available => "Available",
            UnitStatus::Out => "Out",
            UnitStatus::Sold => "Sold",
            UnitStatus::Returned => "Returned",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == label)
    }

    /// Whether a unit in this status may be marked out to a client.
    ///
    /// Available units and legacy `Returned` units re-enter circulation.
    /// `QrGenerated` units have not been received yet.
    pub fn is_dispatchable(self) -> bool {
        matches!(self, UnitStatus::Available | UnitStatus::Returned)
    }

    /// Out or Sold: the unit is committed to a client.
    pub fn is_committed(self) -> bool {
        matches!(self, UnitStatus::Out | UnitStatus::Sold)
    }
}

impl core::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
