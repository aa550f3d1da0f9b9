//! Singleton resource storage with modification tracking.
//!
//! Each resource type has exactly one instance, created when the engine is
//! finalized and mutated in place afterwards. Resource queries subscribe to a
//! type and receive a shared "modified" flag that the store raises whenever a
//! writer reports a change.

use std::any::{Any, TypeId};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::component::Resource;
use crate::error::{EcsError, Result};
use crate::handle::ResourceWriter;

/// Shared per-subscriber modified flag.
pub type ModifiedFlag = Rc<Cell<bool>>;

struct ResourceEntry {
    name: &'static str,
    value: RefCell<Box<dyn Any>>,
    subscribers: Vec<ModifiedFlag>,
}

/// Storage for every resource registered on the engine.
#[derive(Default)]
pub struct ResourceStore {
    entries: HashMap<TypeId, ResourceEntry>,
}

impl ResourceStore {
    /// Create an empty resource store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct and insert the default instance of `R`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::DuplicateResource`] if `R` is already present.
    pub fn insert<R: Resource>(&mut self) -> Result<()> {
        self.insert_value(R::default())
    }

    /// Insert a specific instance of `R`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::DuplicateResource`] if `R` is already present.
    pub fn insert_value<R: Resource>(&mut self, value: R) -> Result<()> {
        let type_id = TypeId::of::<R>();
        if self.entries.contains_key(&type_id) {
            return Err(EcsError::DuplicateResource(R::type_name().to_string()));
        }

        trace!(resource = R::type_name(), "initialised resource");
        self.entries.insert(
            type_id,
            ResourceEntry {
                name: R::type_name(),
                value: RefCell::new(Box::new(value)),
                subscribers: Vec::new(),
            },
        );
        Ok(())
    }

    /// Returns `true` if `R` is present.
    #[must_use]
    pub fn contains<R: Resource>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<R>())
    }

    /// Returns the number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Borrow a resource.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::MissingResource`] if `R` was never added, and
    /// [`EcsError::AlreadyBorrowed`] if it is borrowed mutably.
    pub fn get<R: Resource>(&self) -> Result<Ref<'_, R>> {
        let entry = self.entry::<R>()?;
        let value = entry
            .value
            .try_borrow()
            .map_err(|_| EcsError::AlreadyBorrowed(entry.name.to_string()))?;
        Ref::filter_map(value, |boxed| boxed.downcast_ref::<R>())
            .map_err(|_| EcsError::MissingResource(entry.name.to_string()))
    }

    /// Mint the write capability for `R`.
    ///
    /// Requires exclusive access to the store, so writers exist only for
    /// queries declared `writable()` while systems are being built.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::MissingResource`] if `R` was never added.
    pub fn writer<R: Resource>(&mut self) -> Result<ResourceWriter<R>> {
        self.entry::<R>()?;
        Ok(ResourceWriter::new())
    }

    /// Mutably borrow a resource.
    ///
    /// A shared reference to the store is not enough to write:
    ///
    /// ```compile_fail
    /// use engine_component::{Resource, World};
    ///
    /// #[derive(Default)]
    /// struct Score(u32);
    /// impl Resource for Score {}
    ///
    /// fn cheat(world: &World) {
    ///     world.resources().get_mut::<Score>().unwrap().0 += 1;
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::MissingResource`] if `R` was never added, and
    /// [`EcsError::AlreadyBorrowed`] if it is already borrowed.
    pub fn get_mut<R: Resource>(&self, _writer: &ResourceWriter<R>) -> Result<RefMut<'_, R>> {
        let entry = self.entry::<R>()?;
        let value = entry
            .value
            .try_borrow_mut()
            .map_err(|_| EcsError::AlreadyBorrowed(entry.name.to_string()))?;
        RefMut::filter_map(value, |boxed| boxed.downcast_mut::<R>())
            .map_err(|_| EcsError::MissingResource(entry.name.to_string()))
    }

    /// Subscribe to modifications of `R`, returning the subscriber's flag.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::MissingResource`] if `R` was never added.
    pub fn subscribe<R: Resource>(&mut self) -> Result<ModifiedFlag> {
        let entry = self
            .entries
            .get_mut(&TypeId::of::<R>())
            .ok_or_else(|| EcsError::MissingResource(R::type_name().to_string()))?;
        let flag = ModifiedFlag::default();
        entry.subscribers.push(Rc::clone(&flag));
        Ok(flag)
    }

    /// Flag every subscriber of `R` as modified.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::MissingResource`] if `R` was never added.
    pub fn mark_modified<R: Resource>(&self, _writer: &ResourceWriter<R>) -> Result<()> {
        let entry = self.entry::<R>()?;
        trace!(
            resource = entry.name,
            subscribers = entry.subscribers.len(),
            "resource modified"
        );
        for flag in &entry.subscribers {
            flag.set(true);
        }
        Ok(())
    }

    fn entry<R: Resource>(&self) -> Result<&ResourceEntry> {
        self.entries
            .get(&TypeId::of::<R>())
            .ok_or_else(|| EcsError::MissingResource(R::type_name().to_string()))
    }
}

impl std::fmt::Debug for ResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.values().map(|entry| entry.name))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Score(u32);
    impl Resource for Score {}

    #[derive(Debug, Default)]
    struct Clock;
    impl Resource for Clock {}

    #[test]
    fn test_insert_and_get_default() {
        let mut store = ResourceStore::new();
        store.insert::<Score>().unwrap();
        assert_eq!(*store.get::<Score>().unwrap(), Score(0));
    }

    #[test]
    fn test_duplicate_resource() {
        let mut store = ResourceStore::new();
        store.insert::<Score>().unwrap();
        let err = store.insert::<Score>().unwrap_err();
        assert!(matches!(err, EcsError::DuplicateResource(name) if name == "Score"));
    }

    #[test]
    fn test_missing_resource() {
        let store = ResourceStore::new();
        let err = store.get::<Clock>().unwrap_err();
        assert!(matches!(err, EcsError::MissingResource(name) if name == "Clock"));
    }

    #[test]
    fn test_mutation_in_place() {
        let mut store = ResourceStore::new();
        store.insert::<Score>().unwrap();
        let writer = store.writer::<Score>().unwrap();
        store.get_mut(&writer).unwrap().0 += 3;
        assert_eq!(*store.get::<Score>().unwrap(), Score(3));
    }

    #[test]
    fn test_mark_modified_flags_every_subscriber() {
        let mut store = ResourceStore::new();
        store.insert::<Score>().unwrap();
        store.insert::<Clock>().unwrap();
        let a = store.subscribe::<Score>().unwrap();
        let b = store.subscribe::<Score>().unwrap();
        let other = store.subscribe::<Clock>().unwrap();
        let writer = store.writer::<Score>().unwrap();

        store.mark_modified(&writer).unwrap();
        assert!(a.get());
        assert!(b.get());
        assert!(!other.get());
    }

    #[test]
    fn test_writer_for_missing_resource() {
        let mut store = ResourceStore::new();
        assert!(matches!(
            store.writer::<Clock>(),
            Err(EcsError::MissingResource(name)) if name == "Clock"
        ));
    }

    #[test]
    fn test_subscribe_to_missing_resource() {
        let mut store = ResourceStore::new();
        assert!(matches!(
            store.subscribe::<Clock>(),
            Err(EcsError::MissingResource(_))
        ));
    }
}
