//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Catalog reference data (packages, seasons, services, salons) implements this
/// so it can be indexed by identifier without each type re-stating the lookup.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
