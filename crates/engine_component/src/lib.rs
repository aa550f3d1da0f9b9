//! # engine_component
//!
//! The "C" in ECS: what a component is, how instances are stored, and how the
//! world changes between system turns.
//!
//! This crate provides:
//!
//! - [`Component`], [`Resource`] and [`Bundle`] marker traits.
//! - [`Entity`] and the monotonic [`EntityAllocator`].
//! - [`TypeRegistry`]: dense component ids assigned at registration.
//! - [`ComponentMask`]: growable bitset of component ids.
//! - [`ComponentStore`]: sparse per-type storage with add/remove/change
//!   notifications.
//! - [`ResourceStore`]: singletons with per-subscriber modification flags.
//! - [`World`] and the deferred [`CommandBuffer`].
//! - [`Mut`] and [`ResourceWriter`]: the write paths, both tracked.

pub mod commands;
pub mod component;
pub mod entity;
pub mod error;
pub mod handle;
pub mod mask;
pub mod registry;
pub mod resource;
pub mod store;
pub mod world;

pub use commands::{CommandBuffer, EntityCommands, WorldAccess};
pub use component::{short_type_name, Bundle, Component, ComponentId, ComponentMeta, Resource};
pub use entity::{Entity, EntityAllocator};
pub use error::{EcsError, Result};
pub use handle::{Mut, ResourceWriter};
pub use mask::ComponentMask;
pub use registry::TypeRegistry;
pub use resource::{ModifiedFlag, ResourceStore};
pub use store::{ComponentEvent, ComponentHandler, ComponentStore, EntityEvent, EntityHandler};
pub use world::World;
