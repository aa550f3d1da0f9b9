//! System configuration.

use std::any::TypeId;
use std::fmt;

use engine_component::short_type_name;

use crate::system::System;

/// Identifies a system type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId {
    type_id: TypeId,
    name: &'static str,
}

impl SystemId {
    /// The id of system type `S`.
    #[must_use]
    pub fn of<S: System>() -> Self {
        Self {
            type_id: TypeId::of::<S>(),
            name: short_type_name(std::any::type_name::<S>()),
        }
    }

    /// Human-readable system name (the type name without its module path).
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The Rust type behind the system.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }
}

impl fmt::Debug for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SystemId({})", self.name)
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Scheduling metadata of a system.
///
/// ```ignore
/// impl System for Mover {
///     fn config() -> SystemConfig {
///         SystemConfig::new().run_after::<Logic>()
///     }
///     // ...
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct SystemConfig {
    /// Run only during the first tick (a startup system).
    pub run_once: bool,
    /// Systems that must run before this one, in declaration order.
    pub run_after: Vec<SystemId>,
}

impl SystemConfig {
    /// A steady-state system with no predecessors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the system as a startup system.
    #[must_use]
    pub fn run_once(mut self) -> Self {
        self.run_once = true;
        self
    }

    /// Require `S` to run before this system.
    #[must_use]
    pub fn run_after<S: System>(mut self) -> Self {
        self.run_after.push(SystemId::of::<S>());
        self
    }
}
