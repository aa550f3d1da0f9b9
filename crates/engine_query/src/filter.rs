//! Mask-based entity filters.

use engine_component::{ComponentMask, ComponentStore, Entity};

/// The presence test every query row must pass.
///
/// An entity matches when its mask holds every `includes` bit, none of the
/// `excludes` bits, and at least one bit of each `includes_some` group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaskFilter {
    /// Types the entity must hold.
    pub includes: ComponentMask,
    /// Types the entity must not hold.
    pub excludes: ComponentMask,
    /// Disjunctive groups; the entity must intersect each one.
    pub includes_some: Vec<ComponentMask>,
}

impl MaskFilter {
    /// Test a presence mask against the filter.
    #[must_use]
    pub fn matches(&self, mask: &ComponentMask) -> bool {
        mask.includes_all(&self.includes)
            && mask.excludes_all(&self.excludes)
            && self.includes_some.iter().all(|group| mask.includes_some(group))
    }

    /// Test an entity's current mask. Entities that do not exist never match.
    #[must_use]
    pub fn matches_entity(&self, store: &ComponentStore, entity: Entity) -> bool {
        store.try_mask(entity).is_some_and(|mask| self.matches(mask))
    }
}
