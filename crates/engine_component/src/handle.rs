//! Write handles: the only way to mutate stored data in place.
//!
//! A [`Mut`] borrows a component instance and records a change mark in the
//! turn's [`CommandBuffer`] the first time it is dereferenced mutably. A
//! [`ResourceWriter`] is the capability needed to borrow a resource mutably;
//! it can only be minted with exclusive access to the
//! [`ResourceStore`](crate::ResourceStore), which systems never hold.

use std::cell::RefMut;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use crate::commands::CommandBuffer;
use crate::component::{ComponentId, Resource};
use crate::entity::Entity;

/// A write handle to a component instance.
///
/// The first mutable dereference records a change mark for the instance; the
/// mark turns into change notifications when the turn's buffer is applied.
pub struct Mut<'a, T: 'static> {
    value: RefMut<'a, T>,
    entity: Entity,
    component: ComponentId,
    commands: &'a CommandBuffer,
    marked: bool,
}

impl<'a, T: 'static> Mut<'a, T> {
    pub(crate) fn new(
        value: RefMut<'a, T>,
        entity: Entity,
        component: ComponentId,
        commands: &'a CommandBuffer,
    ) -> Self {
        Self {
            value,
            entity,
            component,
            commands,
            marked: false,
        }
    }

    /// The entity owning the instance.
    #[must_use]
    pub fn entity(&self) -> Entity {
        self.entity
    }
}

impl<T: 'static> Deref for Mut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: 'static> DerefMut for Mut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        if !self.marked {
            self.commands.mark_changed(self.entity, self.component);
            self.marked = true;
        }
        &mut self.value
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Mut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mut")
            .field("entity", &self.entity)
            .field("value", &*self.value)
            .finish()
    }
}

/// Write access to the resource `R`, granted when a writable resource query
/// is built.
pub struct ResourceWriter<R> {
    _marker: PhantomData<fn() -> R>,
}

impl<R: Resource> ResourceWriter<R> {
    pub(crate) fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<R: Resource> fmt::Debug for ResourceWriter<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResourceWriter").field(&R::type_name()).finish()
    }
}
