//! Entities: records whose identity survives changes to their attributes.

/// Anything persisted under a stable, strongly-typed identifier.
pub trait Entity {
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> Self::Id;

    /// Two values describe the same entity when their identifiers match,
    /// regardless of the remaining fields.
    fn same_entity(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
