//! Per-entity component storage with presence masks and notifications.
//!
//! The [`ComponentStore`] owns every component instance between `add` and
//! `remove`/`remove_all`. Each mutation updates the instance and the
//! entity's [`ComponentMask`] together, then synchronously invokes the
//! handlers registered for that component type, in registration order.
//! Handlers receive a shared reference to the store, so they observe the
//! state right after the mutation.
//!
//! The store does no batching. Ordering across a tick is the command
//! buffer's job.

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::commands::CommandBuffer;
use crate::component::ComponentId;
use crate::entity::Entity;
use crate::error::{EcsError, Result};
use crate::handle::Mut;
use crate::mask::ComponentMask;
use crate::registry::TypeRegistry;

/// A handler invoked when a component is added, removed or changed.
pub type ComponentHandler = Rc<dyn Fn(&ComponentStore, Entity, ComponentId)>;

/// A handler invoked when an entity starts or stops existing.
pub type EntityHandler = Rc<dyn Fn(&ComponentStore, Entity)>;

/// The kind of component notification a handler subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentEvent {
    /// A component was added (or overwritten) on an entity.
    Added,
    /// A component was removed from an entity.
    Removed,
    /// A component instance was mutated through a write handle.
    Changed,
}

/// The kind of entity lifecycle notification a handler subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityEvent {
    /// A mask entry was created for the entity.
    Spawned,
    /// The entity lost all its components and its mask entry.
    Despawned,
}

/// A single stored component instance.
type Slot = RefCell<Box<dyn Any>>;

/// Per-type handler lists, indexed by [`ComponentId::index`].
#[derive(Default)]
struct HandlerTable {
    added: Vec<Vec<ComponentHandler>>,
    removed: Vec<Vec<ComponentHandler>>,
    changed: Vec<Vec<ComponentHandler>>,
}

impl HandlerTable {
    fn list(&self, event: ComponentEvent) -> &Vec<Vec<ComponentHandler>> {
        match event {
            ComponentEvent::Added => &self.added,
            ComponentEvent::Removed => &self.removed,
            ComponentEvent::Changed => &self.changed,
        }
    }

    fn list_mut(&mut self, event: ComponentEvent) -> &mut Vec<Vec<ComponentHandler>> {
        match event {
            ComponentEvent::Added => &mut self.added,
            ComponentEvent::Removed => &mut self.removed,
            ComponentEvent::Changed => &mut self.changed,
        }
    }

    fn count(&self) -> usize {
        [&self.added, &self.removed, &self.changed]
            .iter()
            .flat_map(|table| table.iter())
            .map(Vec::len)
            .sum()
    }
}

/// Sparse per-entity component storage.
pub struct ComponentStore {
    /// Component names indexed by id, for error messages and logs.
    names: Vec<&'static str>,
    /// One sparse column per component type.
    columns: Vec<HashMap<Entity, Slot>>,
    /// Presence mask of every live entity.
    masks: HashMap<Entity, ComponentMask>,
    /// Width new masks are created with.
    mask_width: usize,
    handlers: HandlerTable,
    spawn_handlers: Vec<EntityHandler>,
    despawn_handlers: Vec<EntityHandler>,
}

impl ComponentStore {
    /// Create a store sized for every type in `registry`.
    #[must_use]
    pub fn new(registry: &TypeRegistry) -> Self {
        let names: Vec<&'static str> = registry.iter().map(|meta| meta.name).collect();
        let width = names.len();
        Self {
            columns: (0..width).map(|_| HashMap::new()).collect(),
            names,
            masks: HashMap::new(),
            mask_width: width,
            handlers: HandlerTable::default(),
            spawn_handlers: Vec::new(),
            despawn_handlers: Vec::new(),
        }
    }

    /// Returns the name of a component type.
    #[must_use]
    pub fn component_name(&self, id: ComponentId) -> &'static str {
        self.names.get(id.index()).copied().unwrap_or("<unregistered>")
    }

    /// Create an empty mask entry for `entity`, making it exist, and fire the
    /// spawn handlers.
    ///
    /// Does nothing if the entity already exists.
    pub fn insert_entity(&mut self, entity: Entity) {
        if self.masks.contains_key(&entity) {
            return;
        }
        self.masks
            .insert(entity, ComponentMask::with_capacity(self.mask_width));

        trace!(%entity, "entity spawned");
        for handler in &self.spawn_handlers {
            handler(self, entity);
        }
    }

    /// Install a component instance on an entity and fire the add handlers.
    ///
    /// Re-adding an existing component overwrites it without firing the
    /// remove handlers.
    pub fn add(&mut self, entity: Entity, component: ComponentId, value: Box<dyn Any>) {
        self.ensure_column(component);
        self.insert_entity(entity);

        self.columns[component.index()].insert(entity, RefCell::new(value));
        if let Some(mask) = self.masks.get_mut(&entity) {
            mask.set(component, true);
        }

        trace!(%entity, component = self.component_name(component), "component added");
        self.notify(ComponentEvent::Added, entity, component);
    }

    /// Delete a component instance and fire the remove handlers.
    ///
    /// Handlers fire even if the component was absent.
    pub fn remove(&mut self, entity: Entity, component: ComponentId) {
        if let Some(column) = self.columns.get_mut(component.index()) {
            column.remove(&entity);
        }
        if let Some(mask) = self.masks.get_mut(&entity) {
            mask.set(component, false);
        }

        trace!(%entity, component = self.component_name(component), "component removed");
        self.notify(ComponentEvent::Removed, entity, component);
    }

    /// Remove every component of an entity and discard its mask.
    ///
    /// Fires one remove notification per present type, then the despawn
    /// handlers. Does nothing for an entity that does not exist.
    pub fn remove_all(&mut self, entity: Entity) {
        let Some(mask) = self.masks.get(&entity) else {
            return;
        };

        let present: Vec<ComponentId> = mask.iter().collect();
        for component in present {
            self.remove(entity, component);
        }
        self.masks.remove(&entity);

        trace!(%entity, "entity despawned");
        for handler in &self.despawn_handlers {
            handler(self, entity);
        }
    }

    /// Fire the change handlers for a live component instance.
    ///
    /// Does nothing if the entity no longer holds the component.
    pub(crate) fn mark_changed(&self, entity: Entity, component: ComponentId) {
        if !self.contains(entity, component) {
            return;
        }
        trace!(%entity, component = self.component_name(component), "component changed");
        self.notify(ComponentEvent::Changed, entity, component);
    }

    /// Returns `true` if `entity` holds an instance of `component`.
    #[must_use]
    pub fn contains(&self, entity: Entity, component: ComponentId) -> bool {
        self.slot(entity, component).is_some()
    }

    /// Returns `true` if `entity` has a mask entry.
    #[must_use]
    pub fn contains_entity(&self, entity: Entity) -> bool {
        self.masks.contains_key(&entity)
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.masks.len()
    }

    /// Returns an iterator over all live entities, in no particular order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.masks.keys().copied()
    }

    /// Borrow a component instance.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::MissingComponent`] if the entity does not hold the
    /// component (or holds a value of another type), and
    /// [`EcsError::AlreadyBorrowed`] if it is currently borrowed mutably.
    pub fn get<T: 'static>(&self, entity: Entity, component: ComponentId) -> Result<Ref<'_, T>> {
        self.try_get(entity, component)?
            .ok_or_else(|| self.missing(entity, component))
    }

    /// Borrow a component instance, or `None` if the entity does not hold it.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::AlreadyBorrowed`] if the instance is currently
    /// borrowed mutably.
    pub fn try_get<T: 'static>(
        &self,
        entity: Entity,
        component: ComponentId,
    ) -> Result<Option<Ref<'_, T>>> {
        let Some(slot) = self.slot(entity, component) else {
            return Ok(None);
        };
        let value = slot
            .try_borrow()
            .map_err(|_| EcsError::AlreadyBorrowed(self.component_name(component).to_string()))?;
        Ok(Ref::filter_map(value, |boxed| boxed.downcast_ref::<T>()).ok())
    }

    /// Borrow a component instance without naming its type.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::AlreadyBorrowed`] if the instance is currently
    /// borrowed mutably.
    pub fn try_get_any(
        &self,
        entity: Entity,
        component: ComponentId,
    ) -> Result<Option<Ref<'_, dyn Any + 'static>>> {
        let Some(slot) = self.slot(entity, component) else {
            return Ok(None);
        };
        let value = slot
            .try_borrow()
            .map_err(|_| EcsError::AlreadyBorrowed(self.component_name(component).to_string()))?;
        Ok(Some(Ref::map(value, |boxed| &**boxed)))
    }

    /// Obtain a write handle to a component instance.
    ///
    /// Mutating through the handle records a change mark in `commands`, so
    /// every in-place mutation is reported when the buffer is applied. There
    /// is no other way to borrow a stored component mutably:
    ///
    /// ```compile_fail
    /// use engine_component::{Component, ComponentId, Entity, World};
    ///
    /// struct Health(u32);
    /// impl Component for Health {}
    ///
    /// fn heal(world: &World, entity: Entity, id: ComponentId) {
    ///     world.components().get_mut::<Health>(entity, id).unwrap().0 += 1;
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::MissingComponent`] if the entity does not hold the
    /// component, and [`EcsError::AlreadyBorrowed`] if it is currently
    /// borrowed.
    pub fn write<'a, T: 'static>(
        &'a self,
        entity: Entity,
        component: ComponentId,
        commands: &'a CommandBuffer,
    ) -> Result<Mut<'a, T>> {
        let value = self.get_mut::<T>(entity, component)?;
        Ok(Mut::new(value, entity, component, commands))
    }

    pub(crate) fn get_mut<T: 'static>(
        &self,
        entity: Entity,
        component: ComponentId,
    ) -> Result<RefMut<'_, T>> {
        let slot = self
            .slot(entity, component)
            .ok_or_else(|| self.missing(entity, component))?;
        let value = slot
            .try_borrow_mut()
            .map_err(|_| EcsError::AlreadyBorrowed(self.component_name(component).to_string()))?;
        RefMut::filter_map(value, |boxed| boxed.downcast_mut::<T>())
            .map_err(|_| self.missing(entity, component))
    }

    /// Returns the presence mask of an entity.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::MissingEntity`] if the entity has no mask entry.
    pub fn mask(&self, entity: Entity) -> Result<&ComponentMask> {
        self.try_mask(entity).ok_or(EcsError::MissingEntity(entity))
    }

    /// Returns the presence mask of an entity, if it exists.
    #[must_use]
    pub fn try_mask(&self, entity: Entity) -> Option<&ComponentMask> {
        self.masks.get(&entity)
    }

    /// Register a handler for `event` on `component`.
    pub fn subscribe(
        &mut self,
        event: ComponentEvent,
        component: ComponentId,
        handler: ComponentHandler,
    ) {
        let list = self.handlers.list_mut(event);
        if list.len() <= component.index() {
            list.resize_with(component.index() + 1, Vec::new);
        }
        list[component.index()].push(handler);
    }

    /// Register a handler for an entity lifecycle event.
    pub fn subscribe_entity(&mut self, event: EntityEvent, handler: EntityHandler) {
        match event {
            EntityEvent::Spawned => self.spawn_handlers.push(handler),
            EntityEvent::Despawned => self.despawn_handlers.push(handler),
        }
    }

    fn notify(&self, event: ComponentEvent, entity: Entity, component: ComponentId) {
        if let Some(handlers) = self.handlers.list(event).get(component.index()) {
            for handler in handlers {
                handler(self, entity, component);
            }
        }
    }

    fn slot(&self, entity: Entity, component: ComponentId) -> Option<&Slot> {
        self.columns.get(component.index())?.get(&entity)
    }

    fn ensure_column(&mut self, component: ComponentId) {
        if self.columns.len() <= component.index() {
            self.columns.resize_with(component.index() + 1, HashMap::new);
        }
    }

    fn missing(&self, entity: Entity, component: ComponentId) -> EcsError {
        EcsError::MissingComponent {
            entity,
            component: self.component_name(component).to_string(),
        }
    }
}

impl fmt::Debug for ComponentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentStore")
            .field("components", &self.names)
            .field("entities", &self.masks.len())
            .field("handlers", &self.handlers.count())
            .field("spawn_handlers", &self.spawn_handlers.len())
            .field("despawn_handlers", &self.despawn_handlers.len())
            .finish()
    }
}
