//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity and are compared by their attributes: two
/// `Percent(7)` values are the same tax rate regardless of where they came from.
/// They are immutable; "changing" one means building a new value.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
