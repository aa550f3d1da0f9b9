//! Entity queries: live, filtered views over the component store.
//!
//! There are two strategies, picked by the builder:
//!
//! - **Static** queries track membership. They subscribe to add and remove
//!   notifications on every type they reference and re-test an entity's mask
//!   whenever one fires, so their result set is always the set of entities
//!   currently matching the filter.
//! - **Reactive** queries track events. They subscribe only to the configured
//!   conditions and admit an entity once every watched type has fired for it
//!   since the owning system's previous turn. Their results are cleared when
//!   that turn ends.
//!
//! Both expose their rows in ascending entity order, and only while their
//! owning system runs.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;
use std::vec;

use tracing::trace;

use engine_component::{
    CommandBuffer, ComponentId, ComponentStore, EcsError, Entity, Result, World, WorldAccess,
};

use crate::descriptor::QueryDescriptor;
use crate::filter::MaskFilter;
use crate::hooks::QueryHooks;
use crate::row::{Extractor, Row};

/// Shared state between a query handle and its store subscriptions.
pub(crate) struct QueryState {
    filter: MaskFilter,
    extractors: Vec<Extractor>,
    /// Distinct watched types; empty for static queries.
    watched: Vec<ComponentId>,
    rows: RefCell<BTreeSet<Entity>>,
    pending: RefCell<HashMap<Entity, BTreeSet<ComponentId>>>,
    in_turn: Cell<bool>,
}

impl QueryState {
    pub(crate) fn new(filter: MaskFilter, extractors: Vec<Extractor>, watched: Vec<ComponentId>) -> Self {
        Self {
            filter,
            extractors,
            watched,
            rows: RefCell::new(BTreeSet::new()),
            pending: RefCell::new(HashMap::new()),
            in_turn: Cell::new(false),
        }
    }

    fn is_reactive(&self) -> bool {
        !self.watched.is_empty()
    }

    /// Re-test an entity after an add or remove and update membership.
    pub(crate) fn refresh(&self, store: &ComponentStore, entity: Entity) {
        let mut rows = self.rows.borrow_mut();
        if self.filter.matches_entity(store, entity) {
            rows.insert(entity);
        } else {
            rows.remove(&entity);
        }
    }

    /// Drop a despawned entity.
    pub(crate) fn forget(&self, entity: Entity) {
        self.rows.borrow_mut().remove(&entity);
        self.pending.borrow_mut().remove(&entity);
    }

    /// Drop an entity that no longer passes the filters. Never admits one.
    pub(crate) fn evict(&self, store: &ComponentStore, entity: Entity) {
        if self.filter.matches_entity(store, entity) {
            return;
        }
        if self.rows.borrow_mut().remove(&entity) {
            trace!(%entity, "reactive query evicted entity");
        }
        self.pending.borrow_mut().remove(&entity);
    }

    /// Record a watched event and admit the entity once every watched type
    /// has fired.
    pub(crate) fn record(&self, store: &ComponentStore, entity: Entity, component: ComponentId) {
        if !self.filter.matches_entity(store, entity) {
            return;
        }

        let mut pending = self.pending.borrow_mut();
        let fired = pending.entry(entity).or_default();
        fired.insert(component);
        if self.watched.iter().all(|id| fired.contains(id)) {
            pending.remove(&entity);
            self.rows.borrow_mut().insert(entity);
            trace!(%entity, "reactive query admitted entity");
        }
    }

    fn ensure_in_turn(&self) -> Result<()> {
        if self.in_turn.get() {
            Ok(())
        } else {
            Err(EcsError::OutOfScope("entity query"))
        }
    }
}

impl QueryHooks for QueryState {
    fn before_system(&self, _world: &World) {
        self.in_turn.set(true);
    }

    fn after_system(&self, _world: &World) -> Result<()> {
        self.in_turn.set(false);
        if self.is_reactive() {
            self.rows.borrow_mut().clear();
            self.pending.borrow_mut().clear();
        }
        Ok(())
    }
}

/// A compiled entity query owned by one system.
pub struct EntityQuery {
    state: Rc<QueryState>,
    descriptor: QueryDescriptor,
}

impl EntityQuery {
    pub(crate) fn new(state: Rc<QueryState>, descriptor: QueryDescriptor) -> Self {
        Self { state, descriptor }
    }

    /// Returns `true` if this is a change-detection query.
    #[must_use]
    pub fn is_reactive(&self) -> bool {
        self.state.is_reactive()
    }

    /// The data access declaration this query was compiled from.
    #[must_use]
    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    /// Returns the number of entities in the result.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::OutOfScope`] outside the owning system's turn.
    pub fn count(&self) -> Result<usize> {
        self.state.ensure_in_turn()?;
        Ok(self.state.rows.borrow().len())
    }

    /// Returns `true` if the result is empty.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::OutOfScope`] outside the owning system's turn.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.count()? == 0)
    }

    /// Returns `true` if `entity` is in the result.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::OutOfScope`] outside the owning system's turn.
    pub fn contains(&self, entity: Entity) -> Result<bool> {
        self.state.ensure_in_turn()?;
        Ok(self.state.rows.borrow().contains(&entity))
    }

    /// Returns the entities in the result, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::OutOfScope`] outside the owning system's turn.
    pub fn entities(&self) -> Result<Vec<Entity>> {
        self.state.ensure_in_turn()?;
        Ok(self.state.rows.borrow().iter().copied().collect())
    }

    /// Iterate over the result rows, in ascending entity order.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::OutOfScope`] outside the owning system's turn.
    pub fn iter<'a, A>(&'a self, access: &'a A) -> Result<QueryIter<'a>>
    where
        A: WorldAccess + ?Sized,
    {
        let entities = self.entities()?;
        Ok(QueryIter {
            entities: entities.into_iter(),
            extractors: &self.state.extractors,
            access: RowAccess::of(access),
        })
    }

    /// Returns the row of a single entity, or `None` if it is not in the
    /// result.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::OutOfScope`] outside the owning system's turn.
    pub fn get<'a, A>(&'a self, access: &'a A, entity: Entity) -> Result<Option<Row<'a>>>
    where
        A: WorldAccess + ?Sized,
    {
        if !self.contains(entity)? {
            return Ok(None);
        }
        let access = RowAccess::of(access);
        Ok(Some(Row::new(
            entity,
            &self.state.extractors,
            access.world,
            access.commands,
        )))
    }
}

impl fmt::Debug for EntityQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityQuery")
            .field("reactive", &self.is_reactive())
            .field("rows", &self.state.rows.borrow().len())
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

#[derive(Clone, Copy)]
struct RowAccess<'a> {
    world: &'a World,
    commands: &'a CommandBuffer,
}

impl<'a> RowAccess<'a> {
    fn of<A: WorldAccess + ?Sized>(access: &'a A) -> Self {
        Self {
            world: access.world(),
            commands: access.commands(),
        }
    }
}

/// Iterator over the rows of an [`EntityQuery`].
pub struct QueryIter<'a> {
    entities: vec::IntoIter<Entity>,
    extractors: &'a [Extractor],
    access: RowAccess<'a>,
}

impl<'a> Iterator for QueryIter<'a> {
    type Item = Row<'a>;

    fn next(&mut self) -> Option<Row<'a>> {
        let entity = self.entities.next()?;
        Some(Row::new(
            entity,
            self.extractors,
            self.access.world,
            self.access.commands,
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entities.size_hint()
    }
}

impl ExactSizeIterator for QueryIter<'_> {}

impl fmt::Debug for QueryIter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryIter")
            .field("remaining", &self.entities.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use engine_component::{CommandBuffer, EcsError};

    use crate::builder::EntityQueryBuilder;
    use crate::hooks::QuerySet;
    use crate::testing::*;

    use super::*;

    #[test]
    fn test_static_query_seeds_from_existing_entities() {
        let mut world = make_world();
        let a = spawn(&mut world, (Position(1), Velocity(1)));
        let _b = spawn(&mut world, Position(2));
        let c = spawn(&mut world, (Position(3), Velocity(3)));

        let mut queries = QuerySet::new();
        let movers = EntityQueryBuilder::new(&mut world, &mut queries)
            .select::<Position>()
            .select::<Velocity>()
            .build()
            .unwrap();
        assert!(!movers.is_reactive());

        turn(&mut world, &queries, |t| {
            assert_eq!(movers.entities().unwrap(), vec![a, c]);
            let positions: Vec<i32> = movers
                .iter(t)
                .unwrap()
                .map(|row| row.get::<Position>().unwrap().0)
                .collect();
            assert_eq!(positions, vec![1, 3]);
        });
    }

    #[test]
    fn test_spawn_is_visible_to_next_turn_only() {
        let mut world = make_world();
        let mut queries = QuerySet::new();
        let named = EntityQueryBuilder::new(&mut world, &mut queries)
            .select::<Name>()
            .build()
            .unwrap();

        turn(&mut world, &queries, |t| {
            t.commands().spawn(t.world(), Name("alice")).unwrap();
            assert_eq!(named.count().unwrap(), 0);
        });
        turn(&mut world, &queries, |t| {
            assert_eq!(named.count().unwrap(), 1);
            let row = named.iter(t).unwrap().next().unwrap();
            assert_eq!(*row.get::<Name>().unwrap(), Name("alice"));
        });
    }

    #[test]
    fn test_static_membership_follows_filters() {
        let mut world = make_world();
        let mut queries = QuerySet::new();
        let active = EntityQueryBuilder::new(&mut world, &mut queries)
            .select::<Position>()
            .has_some::<(Velocity, Name)>()
            .has_none::<Frozen>()
            .build()
            .unwrap();

        let a = spawn(&mut world, (Position(0), Velocity(1)));
        let b = spawn(&mut world, (Position(0), Name("b")));
        let _c = spawn(&mut world, Position(0));
        let d = spawn(&mut world, (Position(0), Velocity(1), Frozen));

        turn(&mut world, &queries, |t| {
            assert_eq!(active.entities().unwrap(), vec![a, b]);
            assert!(!active.contains(d).unwrap());
            // Gaining a forbidden type evicts; losing a required type evicts.
            t.commands().entity(t.world(), a).add(Frozen).unwrap();
            t.commands().entity(t.world(), b).remove::<Position>().unwrap();
            t.commands().entity(t.world(), d).remove::<Frozen>().unwrap();
        });
        turn(&mut world, &queries, |_| {
            assert_eq!(active.entities().unwrap(), vec![d]);
        });
    }

    #[test]
    fn test_despawn_drops_static_row() {
        let mut world = make_world();
        let mut queries = QuerySet::new();
        let unfrozen = EntityQueryBuilder::new(&mut world, &mut queries)
            .select_id()
            .select::<Name>()
            .optional()
            .has_none::<Frozen>()
            .build()
            .unwrap();

        let e = spawn(&mut world, Position(1));
        turn(&mut world, &queries, |t| {
            assert_eq!(unfrozen.entities().unwrap(), vec![e]);
            t.commands().entity(t.world(), e).despawn();
        });
        turn(&mut world, &queries, |_| {
            assert_eq!(unfrozen.count().unwrap(), 0);
        });
    }

    #[test]
    fn test_optional_field_reads_absent() {
        let mut world = make_world();
        let mut queries = QuerySet::new();
        let query = EntityQueryBuilder::new(&mut world, &mut queries)
            .select_id()
            .select::<Position>()
            .select::<Name>()
            .optional()
            .build()
            .unwrap();

        let named = spawn(&mut world, (Position(1), Name("n")));
        let anonymous = spawn(&mut world, Position(2));

        turn(&mut world, &queries, |t| {
            let row = query.get(t, anonymous).unwrap().unwrap();
            assert!(row.try_get::<Name>().unwrap().is_none());
            assert!(matches!(
                row.get::<Name>(),
                Err(EcsError::MissingComponent { .. })
            ));

            let fields = row.fields().unwrap();
            assert_eq!(fields.len(), 3);
            assert_eq!(fields[0].as_entity(), Some(anonymous));
            assert_eq!(fields[1].downcast_ref::<Position>(), Some(&Position(2)));
            assert!(fields[2].is_absent());

            let row = query.get(t, named).unwrap().unwrap();
            assert_eq!(*row.try_get::<Name>().unwrap().unwrap(), Name("n"));
        });
    }

    #[test]
    fn test_row_access_to_unselected_type() {
        let mut world = make_world();
        let mut queries = QuerySet::new();
        let query = EntityQueryBuilder::new(&mut world, &mut queries)
            .select::<Position>()
            .build()
            .unwrap();
        let e = spawn(&mut world, (Position(1), Velocity(2)));

        turn(&mut world, &queries, |t| {
            let row = query.get(t, e).unwrap().unwrap();
            assert!(matches!(row.get::<Velocity>(), Err(EcsError::NotSelected(name)) if name == "Velocity"));
            assert!(matches!(row.get_mut::<Position>(), Err(EcsError::ReadOnly(_))));
        });
    }

    #[test]
    fn test_query_is_unreadable_outside_turn() {
        let mut world = make_world();
        let mut queries = QuerySet::new();
        let query = EntityQueryBuilder::new(&mut world, &mut queries)
            .select::<Position>()
            .build()
            .unwrap();
        let e = spawn(&mut world, Position(0));

        assert!(matches!(query.count(), Err(EcsError::OutOfScope(_))));
        assert!(query.contains(e).is_err());
        turn(&mut world, &queries, |_| {
            assert_eq!(query.count().unwrap(), 1);
        });
        assert!(query.entities().is_err());
    }

    #[test]
    fn test_write_handle_does_not_fire_until_applied() {
        let mut world = make_world();
        let mut writer_queries = QuerySet::new();
        let writer = EntityQueryBuilder::new(&mut world, &mut writer_queries)
            .select::<Position>()
            .writable()
            .build()
            .unwrap();
        let e = spawn(&mut world, Position(1));

        turn(&mut world, &writer_queries, |t| {
            let row = writer.get(t, e).unwrap().unwrap();
            row.get_mut::<Position>().unwrap().0 += 10;
            assert_eq!(t.commands().len(), 1);
            // The value itself is updated in place.
            assert_eq!(row.get::<Position>().unwrap().0, 11);
        });
        assert_eq!(world.get::<Position>(e).unwrap().0, 11);
    }

    #[test]
    fn test_reading_through_write_handle_does_not_mark() {
        let mut world = make_world();
        let mut queries = QuerySet::new();
        let writer = EntityQueryBuilder::new(&mut world, &mut queries)
            .select::<Position>()
            .writable()
            .build()
            .unwrap();
        let e = spawn(&mut world, Position(4));

        turn(&mut world, &queries, |t| {
            let row = writer.get(t, e).unwrap().unwrap();
            let handle = row.get_mut::<Position>().unwrap();
            assert_eq!(handle.0, 4);
            assert_eq!(handle.entity(), e);
            assert!(t.commands().is_empty());
        });
    }

    /// Two systems: one writing position and velocity, one watching both for
    /// changes.
    fn change_fixture() -> (World, Entity, QuerySet, EntityQuery, QuerySet, EntityQuery) {
        let mut world = make_world();
        let mut writer_queries = QuerySet::new();
        let writer = EntityQueryBuilder::new(&mut world, &mut writer_queries)
            .select::<Position>()
            .writable()
            .select::<Velocity>()
            .writable()
            .build()
            .unwrap();
        let mut watcher_queries = QuerySet::new();
        let watcher = EntityQueryBuilder::new(&mut world, &mut watcher_queries)
            .select::<Position>()
            .changed()
            .select::<Velocity>()
            .changed()
            .build()
            .unwrap();
        let e = spawn(&mut world, (Position(0), Velocity(0)));
        (world, e, writer_queries, writer, watcher_queries, watcher)
    }

    #[test]
    fn test_reactive_requires_every_watched_type() {
        let (mut world, e, writer_queries, writer, watcher_queries, watcher) = change_fixture();
        assert!(watcher.is_reactive());

        turn(&mut world, &writer_queries, |t| {
            let row = writer.get(t, e).unwrap().unwrap();
            row.get_mut::<Position>().unwrap().0 = 5;
        });
        turn(&mut world, &watcher_queries, |_| {
            assert_eq!(watcher.count().unwrap(), 0);
        });
    }

    #[test]
    fn test_reactive_and_join_within_window() {
        let (mut world, e, writer_queries, writer, watcher_queries, watcher) = change_fixture();

        turn(&mut world, &writer_queries, |t| {
            let row = writer.get(t, e).unwrap().unwrap();
            row.get_mut::<Position>().unwrap().0 = 5;
        });
        turn(&mut world, &writer_queries, |t| {
            let row = writer.get(t, e).unwrap().unwrap();
            row.get_mut::<Velocity>().unwrap().0 = 2;
            // A second change mark on the same instance changes nothing.
            row.get_mut::<Velocity>().unwrap().0 = 3;
        });
        turn(&mut world, &watcher_queries, |t| {
            assert_eq!(watcher.entities().unwrap(), vec![e]);
            let row = watcher.iter(t).unwrap().next().unwrap();
            assert_eq!(row.get::<Position>().unwrap().0, 5);
            assert_eq!(row.get::<Velocity>().unwrap().0, 3);
        });
        // Results do not carry over into the next turn.
        turn(&mut world, &watcher_queries, |_| {
            assert_eq!(watcher.count().unwrap(), 0);
        });
    }

    #[test]
    fn test_reactive_window_is_cleared_after_turn() {
        let (mut world, e, writer_queries, writer, watcher_queries, watcher) = change_fixture();

        turn(&mut world, &writer_queries, |t| {
            let row = writer.get(t, e).unwrap().unwrap();
            row.get_mut::<Position>().unwrap().0 = 1;
        });
        turn(&mut world, &watcher_queries, |_| {
            assert_eq!(watcher.count().unwrap(), 0);
        });
        turn(&mut world, &writer_queries, |t| {
            let row = writer.get(t, e).unwrap().unwrap();
            row.get_mut::<Velocity>().unwrap().0 = 1;
        });
        // The position change belonged to the previous window.
        turn(&mut world, &watcher_queries, |_| {
            assert_eq!(watcher.count().unwrap(), 0);
        });
    }

    #[test]
    fn test_added_only_subscribes_to_additions() {
        let mut world = make_world();
        let mut queries = QuerySet::new();
        let greeted = EntityQueryBuilder::new(&mut world, &mut queries)
            .select::<Name>()
            .added()
            .build()
            .unwrap();

        let e = spawn(&mut world, Name("bob"));
        turn(&mut world, &queries, |t| {
            assert_eq!(greeted.entities().unwrap(), vec![e]);
            t.commands().entity(t.world(), e).remove::<Name>().unwrap();
        });
        turn(&mut world, &queries, |_| {
            assert_eq!(greeted.count().unwrap(), 0);
        });
    }

    #[test]
    fn test_removed_field_is_optional() {
        let mut world = make_world();
        let mut queries = QuerySet::new();
        let lost = EntityQueryBuilder::new(&mut world, &mut queries)
            .select_id()
            .select::<Name>()
            .removed()
            .has_all::<Position>()
            .build()
            .unwrap();

        let e = spawn(&mut world, (Position(0), Name("gone")));
        let unpositioned = spawn(&mut world, Name("ignored"));
        let commands = CommandBuffer::new();
        commands.entity(&world, e).remove::<Name>().unwrap();
        commands
            .entity(&world, unpositioned)
            .remove::<Name>()
            .unwrap();
        commands.apply(&mut world).unwrap();

        turn(&mut world, &queries, |t| {
            assert_eq!(lost.entities().unwrap(), vec![e]);
            let row = lost.get(t, e).unwrap().unwrap();
            assert!(row.try_get::<Name>().unwrap().is_none());
            assert!(row.fields().unwrap()[1].is_absent());
        });
    }

    #[test]
    fn test_despawn_after_change_evicts_reactive_row() {
        let mut world = make_world();
        let mut writer_queries = QuerySet::new();
        let writer = EntityQueryBuilder::new(&mut world, &mut writer_queries)
            .select::<Position>()
            .writable()
            .build()
            .unwrap();
        let mut watcher_queries = QuerySet::new();
        let watcher = EntityQueryBuilder::new(&mut world, &mut watcher_queries)
            .select::<Position>()
            .changed()
            .build()
            .unwrap();
        let e = spawn(&mut world, Position(0));
        let survivor = spawn(&mut world, Position(1));

        turn(&mut world, &writer_queries, |t| {
            for row in writer.iter(t).unwrap() {
                row.get_mut::<Position>().unwrap().0 += 1;
            }
        });
        turn(&mut world, &QuerySet::new(), |t| {
            t.commands().entity(t.world(), e).despawn();
        });
        turn(&mut world, &watcher_queries, |t| {
            assert_eq!(watcher.entities().unwrap(), vec![survivor]);
            for row in watcher.iter(t).unwrap() {
                assert_eq!(row.get::<Position>().unwrap().0, 2);
            }
        });
    }

    #[test]
    fn test_losing_required_type_evicts_reactive_row() {
        let mut world = make_world();
        let mut writer_queries = QuerySet::new();
        let writer = EntityQueryBuilder::new(&mut world, &mut writer_queries)
            .select::<Position>()
            .writable()
            .build()
            .unwrap();
        let mut watcher_queries = QuerySet::new();
        let watcher = EntityQueryBuilder::new(&mut world, &mut watcher_queries)
            .select::<Position>()
            .changed()
            .select::<Velocity>()
            .has_none::<Frozen>()
            .build()
            .unwrap();
        let stripped = spawn(&mut world, (Position(0), Velocity(0)));
        let frozen = spawn(&mut world, (Position(0), Velocity(0)));
        let kept = spawn(&mut world, (Position(0), Velocity(0)));

        turn(&mut world, &writer_queries, |t| {
            for row in writer.iter(t).unwrap() {
                row.get_mut::<Position>().unwrap().0 = 3;
            }
        });
        turn(&mut world, &QuerySet::new(), |t| {
            t.commands()
                .entity(t.world(), stripped)
                .remove::<Velocity>()
                .unwrap();
            t.commands().entity(t.world(), frozen).add(Frozen).unwrap();
        });
        turn(&mut world, &watcher_queries, |t| {
            assert_eq!(watcher.entities().unwrap(), vec![kept]);
            let row = watcher.get(t, kept).unwrap().unwrap();
            assert_eq!(row.get::<Velocity>().unwrap().0, 0);
        });
    }

    #[test]
    fn test_reactive_ignores_entities_failing_filters() {
        let mut world = make_world();
        let mut queries = QuerySet::new();
        let fresh = EntityQueryBuilder::new(&mut world, &mut queries)
            .select::<Position>()
            .added()
            .has_none::<Frozen>()
            .build()
            .unwrap();

        let _frozen = spawn(&mut world, (Frozen, Position(0)));
        let live = spawn(&mut world, Position(1));

        turn(&mut world, &queries, |_| {
            assert_eq!(fresh.entities().unwrap(), vec![live]);
        });
    }
}
