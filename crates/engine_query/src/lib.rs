//! # engine_query
//!
//! Declarative access to the world for systems.
//!
//! - [`EntityQueryBuilder`] compiles a selection into an [`EntityQuery`]:
//!   static (incrementally maintained membership) or reactive (edge-triggered
//!   change detection, cleared after every turn).
//! - [`ResourceQuery`] exposes a singleton plus its modified flag.
//! - [`QuerySet`] holds the before/after hooks the executor runs around the
//!   owning system's turn.
//! - [`QueryDescriptor`] records reads, writes and filters for inspection.

pub mod builder;
pub mod descriptor;
pub mod entity;
pub mod filter;
pub mod hooks;
pub mod resource;
pub mod row;

pub use builder::EntityQueryBuilder;
pub use descriptor::{QueryDescriptor, QueryFilter};
pub use entity::{EntityQuery, QueryIter};
pub use filter::MaskFilter;
pub use hooks::{QueryHooks, QuerySet};
pub use resource::{ResourceQuery, ResourceQueryBuilder};
pub use engine_component::Mut;
pub use row::{Field, Row};

#[cfg(test)]
mod testing;
