//! Shared fixtures for driving queries by hand.

use engine_component::{
    Bundle, CommandBuffer, Component, Entity, Resource, ResourceStore, TypeRegistry, World,
    WorldAccess,
};

use crate::hooks::QuerySet;

#[derive(Debug, Clone, PartialEq)]
pub struct Position(pub i32);
impl Component for Position {}

#[derive(Debug, Clone, PartialEq)]
pub struct Velocity(pub i32);
impl Component for Velocity {}

#[derive(Debug, Clone, PartialEq)]
pub struct Name(pub &'static str);
impl Component for Name {}

#[derive(Debug, Clone, PartialEq)]
pub struct Frozen;
impl Component for Frozen {}

#[derive(Debug)]
pub struct Unregistered;
impl Component for Unregistered {}

#[derive(Debug, Default)]
pub struct Clock(pub u32);
impl Resource for Clock {}

pub fn make_world() -> World {
    let mut registry = TypeRegistry::new();
    registry.register::<Position>().unwrap();
    registry.register::<Velocity>().unwrap();
    registry.register::<Name>().unwrap();
    registry.register::<Frozen>().unwrap();
    let mut resources = ResourceStore::new();
    resources.insert::<Clock>().unwrap();
    World::new(registry, resources)
}

/// A system turn outside of any executor.
pub struct Turn<'w> {
    world: &'w World,
    commands: CommandBuffer,
}

impl WorldAccess for Turn<'_> {
    fn world(&self) -> &World {
        self.world
    }

    fn commands(&self) -> &CommandBuffer {
        &self.commands
    }
}

/// Run `body` as one system turn: hooks around it, then apply its buffer.
pub fn turn<F>(world: &mut World, queries: &QuerySet, body: F)
where
    F: FnOnce(&Turn<'_>),
{
    queries.before_system(world);
    let commands = {
        let turn = Turn {
            world: &*world,
            commands: CommandBuffer::new(),
        };
        body(&turn);
        turn.commands
    };
    queries.after_system(world).unwrap();
    commands.apply(world).unwrap();
}

pub fn spawn<B: Bundle>(world: &mut World, bundle: B) -> Entity {
    let commands = CommandBuffer::new();
    let entity = commands.spawn(world, bundle).unwrap();
    commands.apply(world).unwrap();
    entity
}
