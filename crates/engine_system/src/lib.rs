//! # engine_system
//!
//! Authoring surface and ordering for ECS systems.
//!
//! - [`System`]: the trait every system implements.
//! - [`SystemConfig`]: run-once flag and `run_after` predecessors.
//! - [`SystemInit`]: query declaration during construction.
//! - [`SystemContext`]: per-turn world access and command buffer.
//! - [`compute_order`]: dependency-ordered [`Schedule`] with cycle detection.

pub mod config;
pub mod context;
pub mod init;
pub mod scheduler;
pub mod system;

pub use config::{SystemConfig, SystemId};
pub use context::SystemContext;
pub use init::SystemInit;
pub use scheduler::{Schedule, compute_order};
pub use system::{System, SystemEntry};
