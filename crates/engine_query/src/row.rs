//! Query rows and their fields.
//!
//! A row is resolved against live storage every time it is read, so it
//! always reflects the current component values even when the entity was
//! admitted by an earlier event.

use std::any::Any;
use std::cell::Ref;
use std::fmt;

use engine_component::{
    CommandBuffer, Component, ComponentId, EcsError, Entity, Mut, Result, World,
};

/// How one projected field is read from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Extractor {
    /// The entity id itself.
    Entity,
    /// A component instance.
    Component {
        id: ComponentId,
        optional: bool,
        writable: bool,
    },
}

/// One resolved field of a row, in projection order.
pub enum Field<'a> {
    /// The entity id, from `select_id`.
    Entity(Entity),
    /// A borrowed component instance.
    Component(Ref<'a, dyn Any + 'static>),
    /// An optional component the entity does not hold.
    Absent,
}

impl Field<'_> {
    /// Returns the entity id if this is an id field.
    #[must_use]
    pub fn as_entity(&self) -> Option<Entity> {
        match self {
            Self::Entity(entity) => Some(*entity),
            _ => None,
        }
    }

    /// Returns the component value if this field holds a `T`.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            Self::Component(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Returns `true` for an absent optional component.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl fmt::Debug for Field<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(entity) => write!(f, "Entity({entity})"),
            Self::Component(_) => f.write_str("Component(..)"),
            Self::Absent => f.write_str("Absent"),
        }
    }
}

/// A single entity in a query result.
pub struct Row<'a> {
    entity: Entity,
    extractors: &'a [Extractor],
    world: &'a World,
    commands: &'a CommandBuffer,
}

impl<'a> Row<'a> {
    pub(crate) fn new(
        entity: Entity,
        extractors: &'a [Extractor],
        world: &'a World,
        commands: &'a CommandBuffer,
    ) -> Self {
        Self {
            entity,
            extractors,
            world,
            commands,
        }
    }

    /// The entity this row belongs to.
    #[must_use]
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Borrow a selected component.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::NotSelected`] if the query does not project `T` and
    /// [`EcsError::MissingComponent`] if the entity does not hold it (only
    /// possible for optional or removed fields).
    pub fn get<T: Component>(&self) -> Result<Ref<'a, T>> {
        let (id, _) = self.selected::<T>()?;
        self.world.components().get(self.entity, id)
    }

    /// Borrow a selected component, or `None` if the entity does not hold it.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::NotSelected`] if the query does not project `T`.
    pub fn try_get<T: Component>(&self) -> Result<Option<Ref<'a, T>>> {
        let (id, _) = self.selected::<T>()?;
        self.world.components().try_get(self.entity, id)
    }

    /// Obtain a write handle for a selected, writable component.
    ///
    /// Mutating through the handle marks the component changed in the current
    /// turn's command buffer.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ReadOnly`] if the field was not selected with
    /// `writable()`, and [`EcsError::AlreadyBorrowed`] if another handle to the
    /// same instance is alive.
    pub fn get_mut<T: Component>(&self) -> Result<Mut<'a, T>> {
        let (id, writable) = self.selected::<T>()?;
        if !writable {
            return Err(EcsError::ReadOnly(T::type_name().to_string()));
        }
        self.world
            .components()
            .write::<T>(self.entity, id, self.commands)
    }

    /// Resolve every projected field, in projection order.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::MissingComponent`] for a required field the entity
    /// no longer holds.
    pub fn fields(&self) -> Result<Vec<Field<'a>>> {
        let store = self.world.components();
        self.extractors
            .iter()
            .map(|extractor| match *extractor {
                Extractor::Entity => Ok(Field::Entity(self.entity)),
                Extractor::Component { id, optional, .. } => {
                    match store.try_get_any(self.entity, id)? {
                        Some(value) => Ok(Field::Component(value)),
                        None if optional => Ok(Field::Absent),
                        None => Err(EcsError::MissingComponent {
                            entity: self.entity,
                            component: store.component_name(id).to_string(),
                        }),
                    }
                }
            })
            .collect()
    }

    fn selected<T: Component>(&self) -> Result<(ComponentId, bool)> {
        let wanted = self.world.component_id::<T>()?;
        let mut found = None;
        for extractor in self.extractors {
            if let Extractor::Component { id, writable, .. } = *extractor {
                if id == wanted {
                    found = Some(found.unwrap_or(false) || writable);
                }
            }
        }
        found
            .map(|writable| (wanted, writable))
            .ok_or_else(|| EcsError::NotSelected(T::type_name().to_string()))
    }
}

impl fmt::Debug for Row<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Row")
            .field("entity", &self.entity)
            .field("fields", &self.extractors.len())
            .finish()
    }
}
