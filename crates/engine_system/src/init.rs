//! System construction.

use engine_component::{Resource, World};
use engine_query::{EntityQueryBuilder, QuerySet, ResourceQueryBuilder};

/// Handed to [`System::build`](crate::System::build) so the system can
/// declare its queries.
///
/// Every query built through a `SystemInit` is attached to the system being
/// constructed; the executor runs their hooks around that system's turns.
#[derive(Debug)]
pub struct SystemInit<'w> {
    world: &'w mut World,
    queries: QuerySet,
}

impl<'w> SystemInit<'w> {
    /// Start constructing a system against `world`.
    pub fn new(world: &'w mut World) -> Self {
        Self {
            world,
            queries: QuerySet::new(),
        }
    }

    /// Declare an entity query.
    pub fn query(&mut self) -> EntityQueryBuilder<'_> {
        EntityQueryBuilder::new(self.world, &mut self.queries)
    }

    /// Declare a resource query.
    pub fn resource<R: Resource>(&mut self) -> ResourceQueryBuilder<'_, R> {
        ResourceQueryBuilder::new(self.world.resources_mut(), &mut self.queries)
    }

    /// The world the system is being built against.
    #[must_use]
    pub fn world(&self) -> &World {
        self.world
    }

    /// The queries declared so far.
    #[must_use]
    pub fn into_queries(self) -> QuerySet {
        self.queries
    }
}
