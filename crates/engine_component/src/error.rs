//! Error types shared by every layer of the runtime.
//!
//! Every variant describes a programmer or configuration mistake. Nothing in
//! the runtime retries or recovers from them: the call that hit the condition
//! fails and the error travels up to whoever drives the executor.

use crate::entity::Entity;

/// Convenience alias used throughout the engine crates.
pub type Result<T, E = EcsError> = std::result::Result<T, E>;

/// Errors raised by the ECS runtime.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// `get` on an entity that does not hold the component.
    #[error("{entity} does not have component {component}")]
    MissingComponent {
        /// The entity that was inspected.
        entity: Entity,
        /// Name of the missing component type.
        component: String,
    },

    /// Mask lookup on an entity that has no store entry.
    #[error("cannot get mask; {0} does not exist")]
    MissingEntity(Entity),

    /// A resource type that was never added to the engine.
    #[error("cannot find resource {0}; add it to the engine before finalizing")]
    MissingResource(String),

    /// A component type that was never registered.
    #[error("component '{0}' is not registered; register it on the engine before use")]
    NotRegistered(String),

    /// The same component type was registered twice.
    #[error("cannot register component {0}: already registered")]
    DuplicateComponent(String),

    /// The same system type was added twice.
    #[error("cannot add system {0}: already added")]
    DuplicateSystem(String),

    /// The same resource type was added twice.
    #[error("cannot add resource {0}: already added")]
    DuplicateResource(String),

    /// A declared predecessor was never added to the engine.
    #[error("missing system {dependency} (required by {system}); did you forget to add it to the engine?")]
    MissingSystemDependency {
        /// The system declaring the dependency.
        system: String,
        /// The predecessor that could not be found.
        dependency: String,
    },

    /// The declared predecessors form a cycle.
    #[error("system dependency cycle: {}", .cycle.join(" -> "))]
    DependencyCycle {
        /// System names along the cycle; the first name is repeated at the end.
        cycle: Vec<String>,
    },

    /// A run-once system was ordered after a steady-state system.
    #[error("run-once system {system} cannot run after steady-state system {dependency}")]
    StartupDependency {
        /// The run-once system.
        system: String,
        /// Its steady-state predecessor.
        dependency: String,
    },

    /// A command targeted an entity after it was despawned in the same turn.
    #[error("{entity} was despawned earlier in this turn and cannot be mutated")]
    DespawnedEntity {
        /// The despawned entity.
        entity: Entity,
    },

    /// A query builder modifier was used before any `select`.
    #[error("invalid query: no selected component to apply '{0}' to")]
    NoSelectedComponent(&'static str),

    /// A row was asked for a component its query does not project.
    #[error("component {0} is not selected by this query")]
    NotSelected(String),

    /// Mutable access through a query that was not declared writable.
    #[error("{0} is not writable through this query")]
    ReadOnly(String),

    /// A component or resource instance is already borrowed incompatibly.
    #[error("{0} is already borrowed")]
    AlreadyBorrowed(String),

    /// An internal scoped value was accessed outside its dynamic extent.
    #[error("cannot access {0}: called outside of scope")]
    OutOfScope(&'static str),

    /// A tick loop was configured with a non-positive or non-finite rate.
    #[error("invalid tick rate {0}: must be a positive number of ticks per second")]
    InvalidTickRate(f64),

    /// A system body returned an error.
    #[error("system {system} failed")]
    SystemFailed {
        /// Name of the failing system.
        system: String,
        /// The error returned by the system body.
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = EcsError::DependencyCycle {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "system dependency cycle: a -> b -> a");
    }

    #[test]
    fn test_missing_component_message() {
        let err = EcsError::MissingComponent {
            entity: Entity::from_raw(3),
            component: "Position".into(),
        };
        assert_eq!(err.to_string(), "Entity(3) does not have component Position");
    }
}
