use serde::{Deserialize, Serialize};

use slabledger_core::{
    AggregateRoot, BatchId, ClientId, DomainError, DomainResult, PoItemId, StockId, ValueObject,
};

use crate::status::UnitStatus;

/// Delivery-order number printed on the dispatch paperwork.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryOrderNo(String);

impl ValueObject for DeliveryOrderNo {}

impl DeliveryOrderNo {
    pub fn parse(raw: impl AsRef<str>) -> DomainResult<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation(
                "delivery order number is required before dispatch",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for DeliveryOrderNo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which client and delivery order a unit is currently committed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub client_id: ClientId,
    pub delivery_order_no: DeliveryOrderNo,
}

impl ValueObject for Assignment {}

/// How a transition treats the unit's assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentChange {
    Keep,
    Set(Assignment),
    Clear,
}

/// Descriptive product attributes copied from the purchase-order item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDetails {
    pub product_name: String,
    /// `"<width>x<thickness>x<height>"`.
    pub size: String,
    pub category: String,
    /// Resolved from the purchase-order item; `None` when the item has no colour.
    pub colour: Option<String>,
}

impl ValueObject for UnitDetails {}

/// Aggregate root: one physical, individually identified item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUnit {
    id: StockId,
    batch_id: BatchId,
    po_item_id: PoItemId,
    item_code: String,
    barcode: String,
    batch_code: String,
    details: UnitDetails,
    status: UnitStatus,
    assignment: Option<Assignment>,
    version: u64,
}

impl StockUnit {
    /// A freshly registered unit, waiting in `QR Generated` for receipt.
    pub fn generated(
        id: StockId,
        batch_id: BatchId,
        po_item_id: PoItemId,
        item_code: impl Into<String>,
        barcode: impl Into<String>,
        batch_code: impl Into<String>,
        details: UnitDetails,
    ) -> Self {
        Self {
            id,
            batch_id,
            po_item_id,
            item_code: item_code.into(),
            barcode: barcode.into(),
            batch_code: batch_code.into(),
            details,
            status: UnitStatus::QrGenerated,
            assignment: None,
            version: 0,
        }
    }

    /// Rebuild a unit from persisted state.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: StockId,
        batch_id: BatchId,
        po_item_id: PoItemId,
        item_code: String,
        barcode: String,
        batch_code: String,
        details: UnitDetails,
        status: UnitStatus,
        assignment: Option<Assignment>,
        version: u64,
    ) -> Self {
        Self {
            id,
            batch_id,
            po_item_id,
            item_code,
            barcode,
            batch_code,
            details,
            status,
            assignment,
            version,
        }
    }

    pub fn id_typed(&self) -> StockId {
        self.id
    }

    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    pub fn po_item_id(&self) -> PoItemId {
        self.po_item_id
    }

    /// Canonical identifier, e.g. `GR-INV42-I1/3`.
    pub fn item_code(&self) -> &str {
        &self.item_code
    }

    /// Short display barcode printed on the label.
    pub fn barcode(&self) -> &str {
        &self.barcode
    }

    pub fn batch_code(&self) -> &str {
        &self.batch_code
    }

    pub fn details(&self) -> &UnitDetails {
        &self.details
    }

    pub fn status(&self) -> UnitStatus {
        self.status
    }

    pub fn assignment(&self) -> Option<&Assignment> {
        self.assignment.as_ref()
    }

    /// Move to `to` and apply the assignment change. Bumps the version.
    pub fn transition(&mut self, to: UnitStatus, assignment: AssignmentChange) {
        self.status = to;
        match assignment {
            AssignmentChange::Keep => {}
            AssignmentChange::Set(a) => self.assignment = Some(a),
            AssignmentChange::Clear => self.assignment = None,
        }
        self.version += 1;
    }

    /// Entry edge into the ledger: `QR Generated` becomes `Available`.
    ///
    /// Returns `false` (and changes nothing) for units already in circulation.
    pub fn receive(&mut self) -> bool {
        if self.status != UnitStatus::QrGenerated {
            return false;
        }
        self.status = UnitStatus::Available;
        self.version += 1;
        true
    }
}

impl AggregateRoot for StockUnit {
    type Id = StockId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_unit() -> StockUnit {
        StockUnit::generated(
            StockId::new(),
            BatchId::new(),
            PoItemId::new(),
            "GR-INV1-I1/1",
            "A1B2C3",
            "GR-INV1-I1",
            UnitDetails {
                product_name: "Black Galaxy".to_string(),
                size: "60x2x120".to_string(),
                category: "Granite".to_string(),
                colour: Some("Black".to_string()),
            },
        )
    }

    #[test]
    fn delivery_order_number_is_required() {
        assert!(matches!(DeliveryOrderNo::parse("  "), Err(DomainError::Validation(_))));
        assert_eq!(DeliveryOrderNo::parse(" DO-17 ").unwrap().as_str(), "DO-17");
    }

    #[test]
    fn receive_only_moves_generated_units() {
        let mut unit = test_unit();
        assert_eq!(unit.status(), UnitStatus::QrGenerated);
        assert!(unit.receive());
        assert_eq!(unit.status(), UnitStatus::Available);
        assert_eq!(unit.version(), 1);

        assert!(!unit.receive());
        assert_eq!(unit.version(), 1);
    }

    #[test]
    fn transition_applies_assignment_change() {
        let mut unit = test_unit();
        unit.receive();
        let assignment = Assignment {
            client_id: ClientId::new(),
            delivery_order_no: DeliveryOrderNo::parse("DO-1").unwrap(),
        };

        unit.transition(UnitStatus::Out, AssignmentChange::Set(assignment.clone()));
        assert_eq!(unit.assignment(), Some(&assignment));

        unit.transition(UnitStatus::Sold, AssignmentChange::Keep);
        assert_eq!(unit.assignment(), Some(&assignment));

        unit.transition(UnitStatus::Available, AssignmentChange::Clear);
        assert_eq!(unit.assignment(), None);
        assert_eq!(unit.version(), 4);
    }
}
