//! Per-turn execution context provided to system bodies.

use engine_component::{
    Bundle, CommandBuffer, Entity, EntityCommands, Result, World, WorldAccess,
};

/// Context provided to a system on each turn.
///
/// Gives read access to the world and owns the turn's fresh
/// [`CommandBuffer`]. Queries take the context to resolve their rows.
#[derive(Debug)]
pub struct SystemContext<'w> {
    world: &'w World,
    commands: CommandBuffer,
    tick_id: u64,
    dt: f64,
}

impl<'w> SystemContext<'w> {
    /// Create a context for one turn.
    #[must_use]
    pub fn new(world: &'w World, tick_id: u64, dt: f64) -> Self {
        Self {
            world,
            commands: CommandBuffer::new(),
            tick_id,
            dt,
        }
    }

    /// The current tick id, starting at 1.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Seconds since the previous tick started, `0.0` on the first tick.
    #[must_use]
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Spawn a new entity with the given components.
    ///
    /// # Errors
    ///
    /// Fails if a bundle member is not a registered component type.
    pub fn spawn<B: Bundle>(&self, bundle: B) -> Result<Entity> {
        self.commands.spawn(self.world, bundle)
    }

    /// Access the entity commands for an existing entity.
    pub fn entity(&self, entity: Entity) -> EntityCommands<'_> {
        self.commands.entity(self.world, entity)
    }

    /// Hand the recorded intents over for application.
    #[must_use]
    pub fn into_commands(self) -> CommandBuffer {
        self.commands
    }
}

impl WorldAccess for SystemContext<'_> {
    fn world(&self) -> &World {
        self.world
    }

    fn commands(&self) -> &CommandBuffer {
        &self.commands
    }
}
