//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Products, locations, batches and sales are entities: a batch whose quantity
/// drops to zero is still the same batch.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
