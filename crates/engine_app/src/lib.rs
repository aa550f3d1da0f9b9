//! # engine_app
//!
//! Ties the engine crates together: the [`Engine`] builder registers
//! component types, resources and systems, and finalizes them into an
//! [`Executor`] that runs ticks on demand or on a fixed-rate loop.

pub mod engine;
pub mod executor;
pub mod logging;
pub mod tick;

pub use engine::Engine;
pub use executor::Executor;
pub use tick::{Cadence, Pace, TickConfig};

/// Everything needed to author systems and drive an engine.
pub mod prelude {
    pub use engine_component::{Component, EcsError, Entity, Resource, Result, World, WorldAccess};
    pub use engine_query::{EntityQuery, Mut, ResourceQuery, Row};
    pub use engine_system::{System, SystemConfig, SystemContext, SystemInit};
    pub use tracing::level_filters::LevelFilter;

    pub use crate::{Engine, Executor, TickConfig};
}
