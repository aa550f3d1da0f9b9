//! Component type registry.
//!
//! The registry assigns each declared component type a stable, dense
//! [`ComponentId`]. It is an explicit object owned by the engine builder and
//! then by the [`World`](crate::World), so independent worlds never share ids.

use std::any::TypeId;
use std::collections::HashMap;

use tracing::trace;

use crate::component::{Component, ComponentId, ComponentMeta};
use crate::error::{EcsError, Result};

/// Registry of all component types known to a world.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    /// Metadata indexed by [`ComponentId::index`].
    metas: Vec<ComponentMeta>,
    /// Rust type to component id.
    lookup: HashMap<TypeId, ComponentId>,
}

impl TypeRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component type and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::DuplicateComponent`] if `T` is already registered.
    pub fn register<T: Component>(&mut self) -> Result<ComponentId> {
        self.register_type(TypeId::of::<T>(), T::type_name())
    }

    /// Register a component type by its [`TypeId`] and name.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::DuplicateComponent`] if the type is already registered.
    pub fn register_type(&mut self, type_id: TypeId, name: &'static str) -> Result<ComponentId> {
        if self.lookup.contains_key(&type_id) {
            return Err(EcsError::DuplicateComponent(name.to_string()));
        }

        let id = ComponentId(self.metas.len() as u32);
        self.metas.push(ComponentMeta { id, name, type_id });
        self.lookup.insert(type_id, id);
        trace!(component = name, id = id.0, "registered component type");
        Ok(id)
    }

    /// Look up the id of a registered component type.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::NotRegistered`] if `T` was never registered.
    pub fn lookup_id<T: Component>(&self) -> Result<ComponentId> {
        self.lookup_type(TypeId::of::<T>(), T::type_name())
    }

    /// Look up the id of a registered component type by its [`TypeId`].
    ///
    /// `name` is only used for the error message.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::NotRegistered`] if the type was never registered.
    pub fn lookup_type(&self, type_id: TypeId, name: &str) -> Result<ComponentId> {
        self.lookup
            .get(&type_id)
            .copied()
            .ok_or_else(|| EcsError::NotRegistered(name.to_string()))
    }

    /// Returns the metadata for a component id, if registered.
    #[must_use]
    pub fn meta(&self, id: ComponentId) -> Option<&ComponentMeta> {
        self.metas.get(id.index())
    }

    /// Returns the human-readable name for a component id.
    #[must_use]
    pub fn name(&self, id: ComponentId) -> &'static str {
        self.meta(id).map_or("<unregistered>", |meta| meta.name)
    }

    /// Returns the number of registered component types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.metas.len()
    }

    /// Returns `true` if no component type is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metas.is_empty()
    }

    /// Returns an iterator over all registered component types, in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentMeta> {
        self.metas.iter()
    }
}
