//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity: two delivery-order numbers with the same text
/// are the same delivery order, two counter deltas with the same components are
/// the same delta. They are immutable; "changing" one means building a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
