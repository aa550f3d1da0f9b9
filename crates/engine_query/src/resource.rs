//! Resource queries.
//!
//! A [`ResourceQuery`] gives a system access to one singleton and tells it
//! whether a writer touched the singleton since the system's previous turn.
//! The flag is level-triggered for exactly one observation: it is reset when
//! the owning system's turn ends.

use std::cell::{Cell, Ref, RefMut};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use engine_component::{
    EcsError, ModifiedFlag, Resource, ResourceStore, ResourceWriter, Result, World, WorldAccess,
};

use crate::hooks::{QueryHooks, QuerySet};

struct ResourceState<R> {
    modified: ModifiedFlag,
    writer: Option<ResourceWriter<R>>,
    accessed: Cell<bool>,
    in_turn: Cell<bool>,
}

impl<R: Resource> ResourceState<R> {
    fn ensure_in_turn(&self) -> Result<()> {
        if self.in_turn.get() {
            Ok(())
        } else {
            Err(EcsError::OutOfScope("resource query"))
        }
    }
}

impl<R: Resource> QueryHooks for ResourceState<R> {
    fn before_system(&self, _world: &World) {
        self.accessed.set(false);
        self.in_turn.set(true);
    }

    fn after_system(&self, world: &World) -> Result<()> {
        self.in_turn.set(false);
        if let Some(writer) = &self.writer {
            if self.accessed.get() {
                world.resources().mark_modified(writer)?;
            }
        }
        self.modified.set(false);
        Ok(())
    }
}

/// Builds a [`ResourceQuery`] and attaches it to a system.
pub struct ResourceQueryBuilder<'a, R> {
    resources: &'a mut ResourceStore,
    queries: &'a mut QuerySet,
    writable: bool,
    _marker: PhantomData<fn() -> R>,
}

impl<'a, R: Resource> ResourceQueryBuilder<'a, R> {
    /// Start a query for `R`, owned by the system whose queries are collected
    /// in `queries`.
    pub fn new(resources: &'a mut ResourceStore, queries: &'a mut QuerySet) -> Self {
        Self {
            resources,
            queries,
            writable: false,
            _marker: PhantomData,
        }
    }

    /// Allow mutable access to the resource.
    #[must_use]
    pub fn writable(mut self) -> Self {
        self.writable = true;
        self
    }

    /// Subscribe to the resource and attach the query to the owning system.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::MissingResource`] if `R` was never added.
    pub fn build(self) -> Result<ResourceQuery<R>> {
        let modified = self.resources.subscribe::<R>()?;
        let writer = if self.writable {
            Some(self.resources.writer::<R>()?)
        } else {
            None
        };
        let state = Rc::new(ResourceState::<R> {
            modified,
            writer,
            accessed: Cell::new(false),
            in_turn: Cell::new(false),
        });
        self.queries
            .attach(Rc::clone(&state) as Rc<dyn QueryHooks>);
        Ok(ResourceQuery { state })
    }
}

impl<R: Resource> fmt::Debug for ResourceQueryBuilder<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceQueryBuilder")
            .field("resource", &R::type_name())
            .field("writable", &self.writable)
            .finish()
    }
}

/// A resource query owned by one system.
pub struct ResourceQuery<R> {
    state: Rc<ResourceState<R>>,
}

impl<R: Resource> ResourceQuery<R> {
    /// Borrow the resource.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::OutOfScope`] outside the owning system's turn.
    pub fn get<'a, A>(&self, access: &'a A) -> Result<Ref<'a, R>>
    where
        A: WorldAccess + ?Sized,
    {
        self.state.ensure_in_turn()?;
        self.state.accessed.set(true);
        access.world().resources().get::<R>()
    }

    /// Mutably borrow the resource.
    ///
    /// Every other query on `R` will report it modified once this system's
    /// turn ends.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ReadOnly`] unless the query was built with
    /// `writable()`, and [`EcsError::OutOfScope`] outside the owning system's
    /// turn.
    pub fn get_mut<'a, A>(&self, access: &'a A) -> Result<RefMut<'a, R>>
    where
        A: WorldAccess + ?Sized,
    {
        let Some(writer) = &self.state.writer else {
            return Err(EcsError::ReadOnly(R::type_name().to_string()));
        };
        self.state.ensure_in_turn()?;
        self.state.accessed.set(true);
        access.world().resources().get_mut(writer)
    }

    /// Returns `true` if a writer modified the resource since this system's
    /// previous turn.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.state.modified.get()
    }

    /// Returns `true` if the query was built with `writable()`.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.state.writer.is_some()
    }
}

impl<R: Resource> fmt::Debug for ResourceQuery<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceQuery")
            .field("resource", &R::type_name())
            .field("writable", &self.is_writable())
            .field("modified", &self.is_modified())
            .finish()
    }
}
