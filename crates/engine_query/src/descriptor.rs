//! Query descriptors for system data access declarations.
//!
//! A [`QueryDescriptor`] records which component types a query reads, writes
//! and treats as optional, plus its filters. It is compiled alongside the
//! live query by the builder and is purely informational: the runtime runs
//! one system at a time, but descriptors let tooling and tests reason about
//! which systems touch the same data.

use serde::{Deserialize, Serialize};

use engine_component::ComponentId;

/// Describes the data access requirements of a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    /// Component types the query reads immutably.
    pub reads: Vec<ComponentId>,
    /// Component types the query hands out write handles for.
    pub writes: Vec<ComponentId>,
    /// Component types that are optional: entities without them still match.
    pub optionals: Vec<ComponentId>,
    /// Filters applied to the query.
    pub filters: Vec<QueryFilter>,
}

impl QueryDescriptor {
    /// Create a new empty query descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a read-only component requirement.
    #[must_use]
    pub fn read(mut self, id: ComponentId) -> Self {
        self.reads.push(id);
        self
    }

    /// Add a mutable component requirement.
    #[must_use]
    pub fn write(mut self, id: ComponentId) -> Self {
        self.writes.push(id);
        self
    }

    /// Add an optional component.
    #[must_use]
    pub fn optional(mut self, id: ComponentId) -> Self {
        self.optionals.push(id);
        self
    }

    /// Add a query filter.
    #[must_use]
    pub fn filter(mut self, f: QueryFilter) -> Self {
        self.filters.push(f);
        self
    }

    /// Returns all component types that this query accesses (reads + writes + optionals).
    #[must_use]
    pub fn all_accessed_types(&self) -> Vec<ComponentId> {
        let mut types = Vec::new();
        types.extend_from_slice(&self.reads);
        types.extend_from_slice(&self.writes);
        types.extend_from_slice(&self.optionals);
        types
    }

    /// Returns `true` if the query reacts to component events instead of
    /// tracking membership.
    #[must_use]
    pub fn is_reactive(&self) -> bool {
        self.filters.iter().any(QueryFilter::is_reactive)
    }

    /// Checks whether this query conflicts with another.
    ///
    /// Two queries conflict when one writes a component type that the other
    /// reads or writes:
    ///
    /// ```text
    /// A.writes ∩ (B.reads ∪ B.writes) ≠ ∅  OR
    /// B.writes ∩ (A.reads ∪ A.writes) ≠ ∅
    /// ```
    #[must_use]
    pub fn conflicts_with(&self, other: &QueryDescriptor) -> bool {
        let touches = |q: &QueryDescriptor, id: &ComponentId| {
            q.reads.contains(id) || q.writes.contains(id) || q.optionals.contains(id)
        };
        self.writes.iter().any(|w| touches(other, w))
            || other.writes.iter().any(|w| touches(self, w))
    }
}

/// A filter that narrows the set of entities matched by a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryFilter {
    /// Only match entities that have this component.
    With(ComponentId),
    /// Only match entities that do NOT have this component.
    Without(ComponentId),
    /// Only match entities that have at least one of these components.
    WithSome(Vec<ComponentId>),
    /// Only surface entities that gained this component since the last turn.
    Added(ComponentId),
    /// Only surface entities whose component was mutated since the last turn.
    Changed(ComponentId),
    /// Only surface entities that lost this component since the last turn.
    Removed(ComponentId),
}

impl QueryFilter {
    /// Returns `true` for the edge-triggered filters.
    #[must_use]
    pub fn is_reactive(&self) -> bool {
        matches!(self, Self::Added(_) | Self::Changed(_) | Self::Removed(_))
    }
}
