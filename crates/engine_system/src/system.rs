//! The system authoring surface.

use std::fmt;

use engine_component::{Result, World, short_type_name};
use engine_query::QuerySet;

use crate::config::{SystemConfig, SystemId};
use crate::context::SystemContext;
use crate::init::SystemInit;

/// A unit of logic run once per tick.
///
/// A system declares its queries in [`System::build`], reads the world
/// through them in [`System::run`], and expresses every mutation through the
/// context's command buffer.
///
/// ```ignore
/// struct Mover {
///     bodies: EntityQuery,
/// }
///
/// impl System for Mover {
///     fn build(init: &mut SystemInit<'_>) -> Result<Self> {
///         let bodies = init
///             .query()
///             .select::<Position>()
///             .writable()
///             .select::<Velocity>()
///             .build()?;
///         Ok(Self { bodies })
///     }
///
///     fn run(&mut self, ctx: &SystemContext<'_>) -> anyhow::Result<()> {
///         for row in self.bodies.iter(ctx)? {
///             let velocity = row.get::<Velocity>()?.0;
///             row.get_mut::<Position>()?.0 += velocity;
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait System: 'static {
    /// Scheduling metadata. Defaults to a steady-state system with no
    /// predecessors.
    fn config() -> SystemConfig
    where
        Self: Sized,
    {
        SystemConfig::new()
    }

    /// Construct the system and declare its queries.
    ///
    /// # Errors
    ///
    /// Query declarations fail for unregistered component or resource types.
    fn build(init: &mut SystemInit<'_>) -> Result<Self>
    where
        Self: Sized;

    /// Run one turn.
    ///
    /// # Errors
    ///
    /// Any error aborts the tick; the executor reports it as a system failure.
    fn run(&mut self, ctx: &SystemContext<'_>) -> anyhow::Result<()>;

    /// Human-readable system name.
    fn name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

type Factory = fn(&mut SystemInit<'_>) -> Result<Box<dyn System>>;

/// A system type registered with the engine but not yet constructed.
#[derive(Clone)]
pub struct SystemEntry {
    id: SystemId,
    config: SystemConfig,
    factory: Factory,
}

impl SystemEntry {
    /// Capture the id, configuration and constructor of `S`.
    #[must_use]
    pub fn of<S: System>() -> Self {
        Self {
            id: SystemId::of::<S>(),
            config: S::config(),
            factory: construct::<S>,
        }
    }

    /// The system's id.
    #[must_use]
    pub fn id(&self) -> SystemId {
        self.id
    }

    /// The system's scheduling metadata.
    #[must_use]
    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Construct the system against `world`, returning it together with the
    /// queries it declared.
    ///
    /// # Errors
    ///
    /// Propagates the system's [`System::build`] failure.
    pub fn instantiate(&self, world: &mut World) -> Result<(Box<dyn System>, QuerySet)> {
        let mut init = SystemInit::new(world);
        let system = (self.factory)(&mut init)?;
        Ok((system, init.into_queries()))
    }
}

impl fmt::Debug for SystemEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemEntry")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish()
    }
}

fn construct<S: System>(init: &mut SystemInit<'_>) -> Result<Box<dyn System>> {
    Ok(Box::new(S::build(init)?))
}
