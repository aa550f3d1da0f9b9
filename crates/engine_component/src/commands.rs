//! The deferred command buffer.
//!
//! Systems never mutate the world directly. During its turn a system records
//! intents (spawn, add, remove, despawn, and the change marks left by write
//! handles) into a [`CommandBuffer`]; the executor applies the buffer right
//! after the turn, before the next system's query hooks run.
//!
//! Intents are grouped per entity handle in the order the handles were
//! created, and within a group in issuance order. There is no
//! de-duplication.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;

use tracing::{debug, trace};

use crate::component::{Bundle, ComponentId};
use crate::entity::Entity;
use crate::error::{EcsError, Result};
use crate::registry::TypeRegistry;
use crate::world::World;

/// Read access to the world plus the current turn's command buffer.
///
/// Implemented by the per-turn system context; queries use it to resolve rows
/// and to record change marks.
pub trait WorldAccess {
    /// The world being read.
    fn world(&self) -> &World;

    /// The command buffer of the current turn.
    fn commands(&self) -> &CommandBuffer;
}

/// A single recorded intent.
enum Intent {
    /// Create the entity's (empty) mask entry.
    Spawn,
    /// Install a component instance.
    Add(ComponentId, Box<dyn Any>),
    /// Remove a component.
    Remove(ComponentId),
    /// Remove every component and the mask.
    Despawn,
    /// Report an in-place mutation.
    Changed(ComponentId),
}

impl fmt::Debug for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn => f.write_str("Spawn"),
            Self::Add(id, _) => write!(f, "Add({id})"),
            Self::Remove(id) => write!(f, "Remove({id})"),
            Self::Despawn => f.write_str("Despawn"),
            Self::Changed(id) => write!(f, "Changed({id})"),
        }
    }
}

/// Intents issued through one entity handle.
#[derive(Debug)]
struct EntityIntents {
    entity: Entity,
    pending: Vec<Intent>,
}

/// Per-turn log of mutation intents.
///
/// All recording methods take `&self`, so a system can keep reading query
/// results while it issues commands.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    entities: RefCell<Vec<EntityIntents>>,
}

impl CommandBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a new entity with the given components.
    ///
    /// The id is allocated immediately and can be used for further commands in
    /// the same turn; the entity only appears in the world once the buffer is
    /// applied.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::NotRegistered`] if a bundle member is not a
    /// registered component type.
    pub fn spawn<B: Bundle>(&self, world: &World, bundle: B) -> Result<Entity> {
        let components = resolve_bundle(world.registry(), bundle)?;
        let entity = world.allocate_entity();

        let mut pending = Vec::with_capacity(components.len() + 1);
        pending.push(Intent::Spawn);
        pending.extend(
            components
                .into_iter()
                .map(|(id, value)| Intent::Add(id, value)),
        );
        self.entities
            .borrow_mut()
            .push(EntityIntents { entity, pending });

        trace!(%entity, "queued spawn");
        Ok(entity)
    }

    /// Access the entity commands for an existing entity id.
    pub fn entity<'a>(&'a self, world: &'a World, entity: Entity) -> EntityCommands<'a> {
        let mut entities = self.entities.borrow_mut();
        let slot = entities.len();
        entities.push(EntityIntents {
            entity,
            pending: Vec::new(),
        });

        EntityCommands {
            buffer: self,
            registry: world.registry(),
            entity,
            slot,
        }
    }

    /// Record that a component instance was mutated in place.
    pub(crate) fn mark_changed(&self, entity: Entity, component: ComponentId) {
        let mut entities = self.entities.borrow_mut();
        match entities.last_mut() {
            Some(last) if last.entity == entity => last.pending.push(Intent::Changed(component)),
            _ => entities.push(EntityIntents {
                entity,
                pending: vec![Intent::Changed(component)],
            }),
        }
    }

    /// Returns the number of recorded intents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities
            .borrow()
            .iter()
            .map(|group| group.pending.len())
            .sum()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply every intent to the world, in issuance order, and discard the
    /// buffer.
    ///
    /// The buffer is validated before anything is applied, so a rejected
    /// buffer leaves the world untouched.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::DespawnedEntity`] if any intent targets an entity
    /// after that entity's despawn intent.
    pub fn apply(self, world: &mut World) -> Result<()> {
        let groups = self.entities.into_inner();
        validate(&groups)?;

        let intents: usize = groups.iter().map(|group| group.pending.len()).sum();
        if intents > 0 {
            debug!(intents, "applying command buffer");
        }

        let store = world.components_mut();
        for group in groups {
            let entity = group.entity;
            for intent in group.pending {
                match intent {
                    Intent::Spawn => store.insert_entity(entity),
                    Intent::Add(id, value) => store.add(entity, id, value),
                    Intent::Remove(id) => store.remove(entity, id),
                    Intent::Despawn => store.remove_all(entity),
                    Intent::Changed(id) => store.mark_changed(entity, id),
                }
            }
        }
        Ok(())
    }

    fn push(&self, slot: usize, intent: Intent) {
        if let Some(group) = self.entities.borrow_mut().get_mut(slot) {
            group.pending.push(intent);
        }
    }
}

/// Commands targeting one entity.
#[derive(Debug)]
pub struct EntityCommands<'a> {
    buffer: &'a CommandBuffer,
    registry: &'a TypeRegistry,
    entity: Entity,
    slot: usize,
}

impl EntityCommands<'_> {
    /// The targeted entity.
    #[must_use]
    pub fn id(&self) -> Entity {
        self.entity
    }

    /// Add one or more components to the entity.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::NotRegistered`] if a bundle member is not a
    /// registered component type. Nothing is recorded in that case.
    pub fn add<B: Bundle>(self, bundle: B) -> Result<Self> {
        for (id, value) in resolve_bundle(self.registry, bundle)? {
            self.buffer.push(self.slot, Intent::Add(id, value));
        }
        Ok(self)
    }

    /// Remove one or more component types from the entity.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::NotRegistered`] if a type is not registered.
    /// Nothing is recorded in that case.
    pub fn remove<B: Bundle>(self) -> Result<Self> {
        let mut types = Vec::new();
        B::component_types(&mut types);
        let ids = types
            .into_iter()
            .map(|(type_id, name)| self.registry.lookup_type(type_id, name))
            .collect::<Result<Vec<_>>>()?;
        for id in ids {
            self.buffer.push(self.slot, Intent::Remove(id));
        }
        Ok(self)
    }

    /// Remove the entity and all its components.
    pub fn despawn(self) {
        trace!(entity = %self.entity, "queued despawn");
        self.buffer.push(self.slot, Intent::Despawn);
    }
}

fn resolve_bundle<B: Bundle>(
    registry: &TypeRegistry,
    bundle: B,
) -> Result<Vec<(ComponentId, Box<dyn Any>)>> {
    let mut types = Vec::new();
    B::component_types(&mut types);
    let ids = types
        .into_iter()
        .map(|(type_id, name)| registry.lookup_type(type_id, name))
        .collect::<Result<Vec<_>>>()?;

    let mut values = Vec::with_capacity(ids.len());
    bundle.into_components(&mut values);
    Ok(ids.into_iter().zip(values).collect())
}

fn validate(groups: &[EntityIntents]) -> Result<()> {
    let mut despawned = HashSet::new();
    for group in groups {
        for intent in &group.pending {
            if despawned.contains(&group.entity) {
                return Err(EcsError::DespawnedEntity {
                    entity: group.entity,
                });
            }
            if matches!(intent, Intent::Despawn) {
                despawned.insert(group.entity);
            }
        }
    }
    Ok(())
}
