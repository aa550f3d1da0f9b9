//! The engine builder.
//!
//! ```ignore
//! let mut executor = Engine::new()
//!     .component::<Position>()?
//!     .component::<Velocity>()?
//!     .resource::<Clock>()?
//!     .system::<Setup>()?
//!     .system::<Mover>()?
//!     .log_level(LevelFilter::INFO)
//!     .finalize()?;
//!
//! executor.run(&TickConfig { tick_rate: 30.0, max_ticks: 100 })?;
//! ```
//!
//! Registration order does not decide execution order; systems declare
//! their predecessors through [`SystemConfig`](engine_system::SystemConfig).

use std::any::TypeId;
use std::collections::HashSet;
use std::fmt;

use tracing::level_filters::LevelFilter;
use tracing::{debug, info, trace};

use engine_component::{
    Component, EcsError, Resource, ResourceStore, Result, TypeRegistry, World,
};
use engine_system::{System, SystemEntry, compute_order};

use crate::executor::{Executor, ScheduledSystem};
use crate::logging;

type ResourceInit = Box<dyn FnOnce(&mut ResourceStore) -> Result<()>>;

/// Collects component types, resources and systems, then finalizes them
/// into an [`Executor`].
pub struct Engine {
    registry: TypeRegistry,
    resources: Vec<ResourceInit>,
    resource_types: HashSet<TypeId>,
    systems: Vec<SystemEntry>,
    log_level: Option<LevelFilter>,
}

impl Engine {
    /// Create an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: TypeRegistry::new(),
            resources: Vec::new(),
            resource_types: HashSet::new(),
            systems: Vec::new(),
            log_level: None,
        }
    }

    /// Register a component type.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::DuplicateComponent`] if `T` is already registered.
    pub fn component<T: Component>(mut self) -> Result<Self> {
        self.registry.register::<T>()?;
        Ok(self)
    }

    /// Add a resource, constructed with its [`Default`] value at finalize.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::DuplicateResource`] if `R` was already added.
    pub fn resource<R: Resource>(self) -> Result<Self> {
        self.add_resource::<R>(Box::new(|store: &mut ResourceStore| store.insert::<R>()))
    }

    /// Add a resource with an explicit initial value.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::DuplicateResource`] if `R` was already added.
    pub fn insert_resource<R: Resource>(self, value: R) -> Result<Self> {
        self.add_resource::<R>(Box::new(move |store: &mut ResourceStore| store.insert_value(value)))
    }

    /// Add a system.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::DuplicateSystem`] if `S` was already added.
    pub fn system<S: System>(mut self) -> Result<Self> {
        let entry = SystemEntry::of::<S>();
        if self.systems.iter().any(|existing| existing.id() == entry.id()) {
            return Err(EcsError::DuplicateSystem(entry.id().name().to_string()));
        }
        self.systems.push(entry);
        Ok(self)
    }

    /// Install a log subscriber at `level` when the engine is finalized.
    #[must_use]
    pub fn log_level(mut self, level: LevelFilter) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Build the world, order and construct the systems, and return the
    /// executor.
    ///
    /// # Errors
    ///
    /// Fails on a scheduling error ([`EcsError::MissingSystemDependency`],
    /// [`EcsError::StartupDependency`], [`EcsError::DependencyCycle`]) or if a
    /// system's query declarations fail.
    pub fn finalize(self) -> Result<Executor> {
        if let Some(level) = self.log_level {
            if !logging::init(level) {
                debug!("a log subscriber is already installed; keeping it");
            }
        }

        info!(
            components = self.registry.len(),
            resources = self.resources.len(),
            systems = self.systems.len(),
            "finalizing engine"
        );

        let mut resources = ResourceStore::new();
        for init in self.resources {
            init(&mut resources)?;
        }
        let mut world = World::new(self.registry, resources);

        let graph: Vec<_> = self
            .systems
            .iter()
            .map(|entry| (entry.id(), entry.config().clone()))
            .collect();
        let schedule = compute_order(&graph)?;

        let mut scheduled = Vec::with_capacity(self.systems.len());
        for index in schedule.first_tick() {
            let entry = &self.systems[index];
            trace!(system = entry.id().name(), "constructing system");
            let (system, queries) = entry.instantiate(&mut world)?;
            scheduled.push(ScheduledSystem {
                id: entry.id(),
                run_once: entry.config().run_once,
                system,
                queries,
            });
        }

        info!(
            startup = schedule.startup.len(),
            steady = schedule.steady.len(),
            "systems loaded"
        );
        Ok(Executor::new(world, scheduled))
    }

    fn add_resource<R: Resource>(mut self, init: ResourceInit) -> Result<Self> {
        if !self.resource_types.insert(TypeId::of::<R>()) {
            return Err(EcsError::DuplicateResource(R::type_name().to_string()));
        }
        self.resources.push(init);
        Ok(self)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("resources", &self.resources.len())
            .field("systems", &self.systems)
            .field("log_level", &self.log_level)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use engine_system::{SystemConfig, SystemContext, SystemInit};

    use super::*;

    #[derive(Debug)]
    struct Position(i32);
    impl Component for Position {}

    #[derive(Debug, Default)]
    struct Clock(u32);
    impl Resource for Clock {}

    struct Idle;
    impl System for Idle {
        fn build(_: &mut SystemInit<'_>) -> Result<Self> {
            Ok(Self)
        }

        fn run(&mut self, _: &SystemContext<'_>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct Orphan;
    impl System for Orphan {
        fn config() -> SystemConfig {
            SystemConfig::new().run_after::<Idle>()
        }

        fn build(_: &mut SystemInit<'_>) -> Result<Self> {
            Ok(Self)
        }

        fn run(&mut self, _: &SystemContext<'_>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct NeedsPosition;
    impl System for NeedsPosition {
        fn build(init: &mut SystemInit<'_>) -> Result<Self> {
            init.query().select::<Position>().build()?;
            Ok(Self)
        }

        fn run(&mut self, _: &SystemContext<'_>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_duplicate_component() {
        let err = Engine::new()
            .component::<Position>()
            .unwrap()
            .component::<Position>()
            .unwrap_err();
        assert!(matches!(err, EcsError::DuplicateComponent(name) if name == "Position"));
    }

    #[test]
    fn test_duplicate_resource() {
        let err = Engine::new()
            .resource::<Clock>()
            .unwrap()
            .insert_resource(Clock(3))
            .unwrap_err();
        assert!(matches!(err, EcsError::DuplicateResource(name) if name == "Clock"));
    }

    #[test]
    fn test_duplicate_system() {
        let err = Engine::new()
            .system::<Idle>()
            .unwrap()
            .system::<Idle>()
            .unwrap_err();
        assert!(matches!(err, EcsError::DuplicateSystem(name) if name == "Idle"));
    }

    #[test]
    fn test_missing_dependency_fails_finalize() {
        let err = Engine::new()
            .system::<Orphan>()
            .unwrap()
            .finalize()
            .unwrap_err();
        assert!(matches!(err, EcsError::MissingSystemDependency { .. }));
    }

    #[test]
    fn test_unregistered_component_fails_finalize() {
        let err = Engine::new()
            .system::<NeedsPosition>()
            .unwrap()
            .finalize()
            .unwrap_err();
        assert!(matches!(err, EcsError::NotRegistered(name) if name == "Position"));
    }

    #[test]
    fn test_finalize_builds_world() {
        let executor = Engine::new()
            .component::<Position>()
            .unwrap()
            .insert_resource(Clock(9))
            .unwrap()
            .system::<Orphan>()
            .unwrap()
            .system::<Idle>()
            .unwrap()
            .finalize()
            .unwrap();

        assert_eq!(executor.tick_id(), 0);
        assert_eq!(executor.world().resource::<Clock>().unwrap().0, 9);
        assert_eq!(executor.system_names(), vec!["Idle", "Orphan"]);
    }
}
