//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values; a
/// `Price` of `120.00` is the same price wherever it appears. To "modify" one,
/// build a new value.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
