//! World state: registry, entity allocation, components and resources.
//!
//! The [`World`] is the single source of truth for a running engine. Systems
//! only ever see it through a shared reference; structural changes reach it
//! through a [`CommandBuffer`](crate::CommandBuffer) applied between turns.

use std::cell::Ref;

use crate::component::{Component, ComponentId, Resource};
use crate::entity::{Entity, EntityAllocator};
use crate::error::Result;
use crate::mask::ComponentMask;
use crate::registry::TypeRegistry;
use crate::resource::ResourceStore;
use crate::store::ComponentStore;

/// The state of an ECS runtime.
#[derive(Debug)]
pub struct World {
    /// Component type registry, frozen once the world exists.
    registry: TypeRegistry,
    /// Entity ID allocator.
    allocator: EntityAllocator,
    /// Component instances and presence masks.
    components: ComponentStore,
    /// Singleton resources.
    resources: ResourceStore,
}

impl World {
    /// Create a world for the given component types and resources.
    #[must_use]
    pub fn new(registry: TypeRegistry, resources: ResourceStore) -> Self {
        let components = ComponentStore::new(&registry);
        Self {
            registry,
            allocator: EntityAllocator::new(),
            components,
            resources,
        }
    }

    /// Returns the component type registry.
    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Returns the component store.
    #[must_use]
    pub fn components(&self) -> &ComponentStore {
        &self.components
    }

    /// Returns the component store mutably.
    pub fn components_mut(&mut self) -> &mut ComponentStore {
        &mut self.components
    }

    /// Returns the resource store.
    #[must_use]
    pub fn resources(&self) -> &ResourceStore {
        &self.resources
    }

    /// Returns the resource store mutably.
    pub fn resources_mut(&mut self) -> &mut ResourceStore {
        &mut self.resources
    }

    /// Allocate a fresh entity id.
    ///
    /// The entity does not exist until a spawn intent for it is applied.
    pub fn allocate_entity(&self) -> Entity {
        self.allocator.allocate()
    }

    /// Returns the number of entity ids handed out so far.
    #[must_use]
    pub fn allocated_entities(&self) -> u64 {
        self.allocator.count()
    }

    /// Returns the id of a registered component type.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::NotRegistered`](crate::EcsError::NotRegistered) for
    /// an unknown type.
    pub fn component_id<T: Component>(&self) -> Result<ComponentId> {
        self.registry.lookup_id::<T>()
    }

    /// Borrow a component of an entity.
    ///
    /// # Errors
    ///
    /// Fails if `T` is not registered or the entity does not hold it.
    pub fn get<T: Component>(&self, entity: Entity) -> Result<Ref<'_, T>> {
        let id = self.component_id::<T>()?;
        self.components.get(entity, id)
    }

    /// Borrow a component of an entity, or `None` if it does not hold it.
    ///
    /// # Errors
    ///
    /// Fails if `T` is not registered or the instance is borrowed mutably.
    pub fn try_get<T: Component>(&self, entity: Entity) -> Result<Option<Ref<'_, T>>> {
        let id = self.component_id::<T>()?;
        self.components.try_get(entity, id)
    }

    /// Returns the presence mask of an entity.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::MissingEntity`](crate::EcsError::MissingEntity) if
    /// the entity does not exist.
    pub fn mask(&self, entity: Entity) -> Result<&ComponentMask> {
        self.components.mask(entity)
    }

    /// Returns `true` if the entity exists.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.components.contains_entity(entity)
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.components.entity_count()
    }

    /// Borrow a resource.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::MissingResource`](crate::EcsError::MissingResource)
    /// if `R` was never added.
    pub fn resource<R: Resource>(&self) -> Result<Ref<'_, R>> {
        self.resources.get::<R>()
    }
}
