//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity and are immutable once built. An allocation
/// deduction `{batch, quantity taken}` is one: two deductions naming the same
/// batch and quantity are interchangeable.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct Deduction { batch_number: String, quantity_taken: i64 }
///
/// impl ValueObject for Deduction {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
