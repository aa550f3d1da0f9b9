//! Before/after hooks that bracket a system's turn.
//!
//! Every query registers its hooks with the [`QuerySet`] of the system that
//! owns it. The executor calls [`QuerySet::before_system`] right before the
//! system body and [`QuerySet::after_system`] right after, before the turn's
//! command buffer is applied.

use std::fmt;
use std::rc::Rc;

use engine_component::{Result, World};

/// Lifecycle callbacks of a query attached to a system.
pub trait QueryHooks {
    /// Called right before the owning system runs.
    fn before_system(&self, world: &World);

    /// Called right after the owning system returns.
    ///
    /// # Errors
    ///
    /// Propagates failures from the world (e.g. a resource that vanished).
    fn after_system(&self, world: &World) -> Result<()>;
}

/// The queries attached to one system, in declaration order.
#[derive(Default)]
pub struct QuerySet {
    hooks: Vec<Rc<dyn QueryHooks>>,
}

impl QuerySet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a query's hooks.
    pub fn attach(&mut self, hooks: Rc<dyn QueryHooks>) {
        self.hooks.push(hooks);
    }

    /// Returns the number of attached queries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns `true` if no query is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every before-hook, in declaration order.
    pub fn before_system(&self, world: &World) {
        for hooks in &self.hooks {
            hooks.before_system(world);
        }
    }

    /// Run every after-hook, in declaration order.
    ///
    /// # Errors
    ///
    /// Stops at the first failing hook.
    pub fn after_system(&self, world: &World) -> Result<()> {
        for hooks in &self.hooks {
            hooks.after_system(world)?;
        }
        Ok(())
    }
}

impl fmt::Debug for QuerySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySet")
            .field("queries", &self.hooks.len())
            .finish()
    }
}
