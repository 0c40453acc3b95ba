use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use slabledger_core::{ClientId, Entity, ReturnId, StockId};

use crate::movement::MovementKind;
use crate::unit::{DeliveryOrderNo, StockUnit};

/// Placeholder shown for snapshot fields that did not resolve.
pub const UNKNOWN: &str = "-";

/// Which side of the invoice a return happens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnPhase {
    /// The unit is `Out` and has not been invoiced.
    Before,
    /// The unit is `Sold`.
    After,
}

impl ReturnPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ReturnPhase::Before => "before",
            ReturnPhase::After => "after",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "before" => Some(ReturnPhase::Before),
            "after" => Some(ReturnPhase::After),
            _ => None,
        }
    }

    pub fn movement_kind(self) -> MovementKind {
        match self {
            ReturnPhase::Before => MovementKind::ReturnBeforeInvoice,
            ReturnPhase::After => MovementKind::ReturnAfterSale,
        }
    }

    /// Tag appended to the reason in the returns register.
    pub fn tag(self) -> &'static str {
        self.movement_kind().as_str()
    }
}

/// Append-only returns-register row with a point-in-time snapshot of the unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnEntry {
    pub return_id: ReturnId,
    pub stock_id: StockId,
    pub item_codes: Vec<String>,
    pub product_name: String,
    pub size: String,
    pub batch_code: String,
    pub client_id: Option<ClientId>,
    pub client_name: String,
    pub delivery_order_no: Option<DeliveryOrderNo>,
    pub colour: String,
    /// `"<reason> | <phase tag>"`.
    pub reason: String,
    pub is_bulk: bool,
    pub phase: ReturnPhase,
    pub return_date: NaiveDate,
}

impl ReturnEntry {
    /// Snapshot `unit` as it is right now, before the return clears its assignment.
    pub fn snapshot(
        return_id: ReturnId,
        unit: &StockUnit,
        phase: ReturnPhase,
        reason: &str,
        client_name: Option<String>,
        return_date: NaiveDate,
    ) -> Self {
        let details = unit.details();
        let assignment = unit.assignment();
        Self {
            return_id,
            stock_id: unit.id_typed(),
            item_codes: vec![unit.item_code().to_string()],
            product_name: details.product_name.clone(),
            size: details.size.clone(),
            batch_code: unit.batch_code().to_string(),
            client_id: assignment.map(|a| a.client_id),
            client_name: client_name.unwrap_or_else(|| UNKNOWN.to_string()),
            delivery_order_no: assignment.map(|a| a.delivery_order_no.clone()),
            colour: details.colour.clone().unwrap_or_else(|| UNKNOWN.to_string()),
            reason: format!("{} | {}", reason.trim(), phase.tag()),
            is_bulk: false,
            phase,
            return_date,
        }
    }
}

impl Entity for ReturnEntry {
    type Id = ReturnId;

    fn id(&self) -> &Self::Id {
        &self.return_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::UnitStatus;
    use crate::unit::{Assignment, AssignmentChange, UnitDetails};
    use slabledger_core::{BatchId, PoItemId};

    #[test]
    fn snapshot_captures_assignment_and_tags_reason() {
        let client_id = ClientId::new();
        let mut unit = StockUnit::generated(
            StockId::new(),
            BatchId::new(),
            PoItemId::new(),
            "QR-PO9-I2/4",
            "ZX81AB",
            "QR-PO9-I2",
            UnitDetails {
                product_name: "Calacatta".to_string(),
                size: "-x3x-".to_string(),
                category: "Quartz".to_string(),
                colour: None,
            },
        );
        unit.receive();
        unit.transition(
            UnitStatus::Out,
            AssignmentChange::Set(Assignment {
                client_id,
                delivery_order_no: DeliveryOrderNo::parse("DO-88").unwrap(),
            }),
        );

        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let entry = ReturnEntry::snapshot(
            ReturnId::new(),
            &unit,
            ReturnPhase::Before,
            " chipped edge ",
            None,
            date,
        );

        assert_eq!(entry.item_codes, vec!["QR-PO9-I2/4".to_string()]);
        assert_eq!(entry.client_id, Some(client_id));
        assert_eq!(entry.client_name, UNKNOWN);
        assert_eq!(entry.colour, UNKNOWN);
        assert_eq!(entry.delivery_order_no.as_ref().map(|d| d.as_str()), Some("DO-88"));
        assert_eq!(entry.reason, "chipped edge | Return Before Invoice");
        assert!(!entry.is_bulk);
        assert_eq!(entry.return_date, date);
    }
}
