//! The fluent entity query builder.
//!
//! ```ignore
//! let movers = init
//!     .query()
//!     .select_id()
//!     .select::<Position>()
//!     .writable()
//!     .select::<Velocity>()
//!     .has_none::<Frozen>()
//!     .build()?;
//! ```
//!
//! Field modifiers (`optional`, `writable`, `added`, `changed`, `removed`)
//! apply to the most recent `select`. Any error (an unregistered type, a
//! modifier with nothing selected) is remembered and reported by `build`.

use std::collections::BTreeSet;
use std::rc::Rc;

use tracing::debug;

use engine_component::{
    Bundle, Component, ComponentEvent, ComponentHandler, ComponentId, ComponentStore, EcsError,
    Entity, EntityEvent, EntityHandler, Result, World,
};

use crate::descriptor::{QueryDescriptor, QueryFilter};
use crate::entity::{EntityQuery, QueryState};
use crate::filter::MaskFilter;
use crate::hooks::{QueryHooks, QuerySet};
use crate::row::Extractor;

/// Which events a reactive field watches.
#[derive(Debug, Clone, Copy, Default)]
struct Watch {
    added: bool,
    changed: bool,
    removed: bool,
}

impl Watch {
    fn any(self) -> bool {
        self.added || self.changed || self.removed
    }
}

/// The field currently being configured.
#[derive(Debug)]
struct Selection {
    id: ComponentId,
    name: &'static str,
    optional: bool,
    writable: bool,
    watch: Watch,
}

/// Builds an [`EntityQuery`] and attaches it to a system.
#[derive(Debug)]
pub struct EntityQueryBuilder<'a> {
    world: &'a mut World,
    queries: &'a mut QuerySet,
    filter: MaskFilter,
    extractors: Vec<Extractor>,
    watchers: Vec<(ComponentId, Watch)>,
    referenced: BTreeSet<ComponentId>,
    descriptor: QueryDescriptor,
    current: Option<Selection>,
    error: Option<EcsError>,
}

impl<'a> EntityQueryBuilder<'a> {
    /// Start a query against `world`, owned by the system whose queries are
    /// collected in `queries`.
    pub fn new(world: &'a mut World, queries: &'a mut QuerySet) -> Self {
        Self {
            world,
            queries,
            filter: MaskFilter::default(),
            extractors: Vec::new(),
            watchers: Vec::new(),
            referenced: BTreeSet::new(),
            descriptor: QueryDescriptor::new(),
            current: None,
            error: None,
        }
    }

    /// Project the entity id into each row.
    #[must_use]
    pub fn select_id(mut self) -> Self {
        self.finish_current();
        self.extractors.push(Extractor::Entity);
        self
    }

    /// Project a component. Entities without it are excluded unless the field
    /// is made optional or reactive.
    #[must_use]
    pub fn select<T: Component>(mut self) -> Self {
        self.finish_current();
        if let Some(id) = self.lookup(self.world.component_id::<T>()) {
            self.current = Some(Selection {
                id,
                name: T::type_name(),
                optional: false,
                writable: false,
                watch: Watch::default(),
            });
        }
        self
    }

    /// Keep entities without the selected component; the field reads as
    /// absent for them.
    #[must_use]
    pub fn optional(self) -> Self {
        self.modify("optional", |field| field.optional = true)
    }

    /// Allow write handles to the selected component.
    #[must_use]
    pub fn writable(self) -> Self {
        self.modify("writable", |field| field.writable = true)
    }

    /// Only surface entities that gained the selected component since the
    /// system's previous turn.
    #[must_use]
    pub fn added(self) -> Self {
        self.modify("added", |field| field.watch.added = true)
    }

    /// Only surface entities whose selected component was mutated since the
    /// system's previous turn.
    #[must_use]
    pub fn changed(self) -> Self {
        self.modify("changed", |field| field.watch.changed = true)
    }

    /// Only surface entities that lost the selected component since the
    /// system's previous turn. The field reads as absent.
    #[must_use]
    pub fn removed(self) -> Self {
        self.modify("removed", |field| field.watch.removed = true)
    }

    /// Require every component in `B`.
    #[must_use]
    pub fn has_all<B: Bundle>(mut self) -> Self {
        self.finish_current();
        for id in self.lookup_bundle::<B>() {
            self.filter.includes.set(id, true);
            self.referenced.insert(id);
            self.descriptor.filters.push(QueryFilter::With(id));
        }
        self
    }

    /// Require at least one component in `B`.
    #[must_use]
    pub fn has_some<B: Bundle>(mut self) -> Self {
        self.finish_current();
        let ids = self.lookup_bundle::<B>();
        if !ids.is_empty() {
            self.filter.includes_some.push(ids.iter().copied().collect());
            self.referenced.extend(ids.iter().copied());
            self.descriptor.filters.push(QueryFilter::WithSome(ids));
        }
        self
    }

    /// Exclude entities holding any component in `B`.
    #[must_use]
    pub fn has_none<B: Bundle>(mut self) -> Self {
        self.finish_current();
        for id in self.lookup_bundle::<B>() {
            self.filter.excludes.set(id, true);
            self.referenced.insert(id);
            self.descriptor.filters.push(QueryFilter::Without(id));
        }
        self
    }

    /// Compile the query, subscribe it to the store and attach it to the
    /// owning system.
    ///
    /// A query with at least one reactive field is reactive; otherwise it is
    /// static and is seeded with the entities that already match.
    ///
    /// # Errors
    ///
    /// Returns the first error hit while building: [`EcsError::NotRegistered`]
    /// for an unknown type or [`EcsError::NoSelectedComponent`] for a modifier
    /// with no preceding `select`.
    pub fn build(mut self) -> Result<EntityQuery> {
        self.finish_current();
        if let Some(err) = self.error {
            return Err(err);
        }

        let watched: Vec<ComponentId> = self.watchers.iter().map(|(id, _)| *id).collect();
        let state = Rc::new(QueryState::new(self.filter, self.extractors, watched));
        let store = self.world.components_mut();

        if self.watchers.is_empty() {
            subscribe_static(store, &state, &self.referenced);
        } else {
            subscribe_reactive(store, &state, &self.watchers, &self.referenced);
        }
        self.queries.attach(Rc::clone(&state) as Rc<dyn QueryHooks>);

        let query = EntityQuery::new(state, self.descriptor);
        debug!(
            reactive = query.is_reactive(),
            fields = query.descriptor().all_accessed_types().len(),
            "entity query built"
        );
        Ok(query)
    }

    fn modify(mut self, modifier: &'static str, apply: impl FnOnce(&mut Selection)) -> Self {
        match self.current.as_mut() {
            Some(field) => apply(field),
            None => {
                if self.error.is_none() {
                    self.error = Some(EcsError::NoSelectedComponent(modifier));
                }
            }
        }
        self
    }

    fn finish_current(&mut self) {
        let Some(field) = self.current.take() else {
            return;
        };
        let reactive = field.watch.any();

        if !field.optional && !reactive {
            self.filter.includes.set(field.id, true);
        }
        self.referenced.insert(field.id);
        self.extractors.push(Extractor::Component {
            id: field.id,
            optional: field.optional || field.watch.removed,
            writable: field.writable,
        });

        if field.writable {
            self.descriptor.writes.push(field.id);
        } else if field.optional {
            self.descriptor.optionals.push(field.id);
        } else {
            self.descriptor.reads.push(field.id);
        }

        if reactive {
            let watch = field.watch;
            if watch.added {
                self.descriptor.filters.push(QueryFilter::Added(field.id));
            }
            if watch.changed {
                self.descriptor.filters.push(QueryFilter::Changed(field.id));
            }
            if watch.removed {
                self.descriptor.filters.push(QueryFilter::Removed(field.id));
            }
            match self.watchers.iter_mut().find(|(id, _)| *id == field.id) {
                Some((_, existing)) => {
                    existing.added |= watch.added;
                    existing.changed |= watch.changed;
                    existing.removed |= watch.removed;
                }
                None => self.watchers.push((field.id, watch)),
            }
        }

        debug!(component = field.name, reactive, "query field selected");
    }

    fn lookup(&mut self, id: Result<ComponentId>) -> Option<ComponentId> {
        match id {
            Ok(id) => Some(id),
            Err(err) => {
                if self.error.is_none() {
                    self.error = Some(err);
                }
                None
            }
        }
    }

    fn lookup_bundle<B: Bundle>(&mut self) -> Vec<ComponentId> {
        let mut types = Vec::new();
        B::component_types(&mut types);
        let mut ids = Vec::with_capacity(types.len());
        for (type_id, name) in types {
            let id = self.world.registry().lookup_type(type_id, name);
            if let Some(id) = self.lookup(id) {
                ids.push(id);
            }
        }
        ids
    }
}

fn subscribe_static(store: &mut ComponentStore, state: &Rc<QueryState>, referenced: &BTreeSet<ComponentId>) {
    let target = Rc::clone(state);
    let handler: ComponentHandler = Rc::new(move |store: &ComponentStore, entity: Entity, _: ComponentId| {
        target.refresh(store, entity);
    });
    for &id in referenced {
        store.subscribe(ComponentEvent::Added, id, Rc::clone(&handler));
        store.subscribe(ComponentEvent::Removed, id, Rc::clone(&handler));
    }

    let target = Rc::clone(state);
    let spawned: EntityHandler = Rc::new(move |store: &ComponentStore, entity: Entity| {
        target.refresh(store, entity);
    });
    store.subscribe_entity(EntityEvent::Spawned, spawned);

    let target = Rc::clone(state);
    let despawned: EntityHandler = Rc::new(move |_: &ComponentStore, entity: Entity| {
        target.forget(entity);
    });
    store.subscribe_entity(EntityEvent::Despawned, despawned);

    let existing: Vec<Entity> = store.entities().collect();
    for entity in existing {
        state.refresh(store, entity);
    }
}

fn subscribe_reactive(
    store: &mut ComponentStore,
    state: &Rc<QueryState>,
    watchers: &[(ComponentId, Watch)],
    referenced: &BTreeSet<ComponentId>,
) {
    let target = Rc::clone(state);
    let handler: ComponentHandler =
        Rc::new(move |store: &ComponentStore, entity: Entity, component: ComponentId| {
            target.record(store, entity, component);
        });
    for &(id, watch) in watchers {
        if watch.added {
            store.subscribe(ComponentEvent::Added, id, Rc::clone(&handler));
        }
        if watch.changed {
            store.subscribe(ComponentEvent::Changed, id, Rc::clone(&handler));
        }
        if watch.removed {
            store.subscribe(ComponentEvent::Removed, id, Rc::clone(&handler));
        }
    }

    // Admitted rows must keep passing the filters until the owner reads them.
    let target = Rc::clone(state);
    let recheck: ComponentHandler = Rc::new(move |store: &ComponentStore, entity: Entity, _: ComponentId| {
        target.evict(store, entity);
    });
    for &id in referenced {
        store.subscribe(ComponentEvent::Added, id, Rc::clone(&recheck));
        store.subscribe(ComponentEvent::Removed, id, Rc::clone(&recheck));
    }

    let target = Rc::clone(state);
    let despawned: EntityHandler = Rc::new(move |_: &ComponentStore, entity: Entity| {
        target.forget(entity);
    });
    store.subscribe_entity(EntityEvent::Despawned, despawned);
}

#[cfg(test)]
mod tests {
    use crate::testing::*;

    use super::*;

    #[test]
    fn test_modifier_without_select() {
        let mut world = make_world();
        let mut queries = QuerySet::new();
        let err = EntityQueryBuilder::new(&mut world, &mut queries)
            .writable()
            .select::<Position>()
            .build()
            .unwrap_err();
        assert!(matches!(err, EcsError::NoSelectedComponent("writable")));
        assert!(queries.is_empty());
    }

    #[test]
    fn test_unregistered_type_fails_build() {
        let mut world = make_world();
        let mut queries = QuerySet::new();
        let err = EntityQueryBuilder::new(&mut world, &mut queries)
            .select::<Position>()
            .has_none::<Unregistered>()
            .build()
            .unwrap_err();
        assert!(matches!(err, EcsError::NotRegistered(name) if name == "Unregistered"));
    }

    #[test]
    fn test_descriptor_records_access() {
        let mut world = make_world();
        let position = world.component_id::<Position>().unwrap();
        let velocity = world.component_id::<Velocity>().unwrap();
        let name = world.component_id::<Name>().unwrap();
        let frozen = world.component_id::<Frozen>().unwrap();

        let mut queries = QuerySet::new();
        let query = EntityQueryBuilder::new(&mut world, &mut queries)
            .select::<Position>()
            .writable()
            .select::<Velocity>()
            .select::<Name>()
            .optional()
            .has_none::<Frozen>()
            .build()
            .unwrap();

        let descriptor = query.descriptor();
        assert_eq!(descriptor.writes, vec![position]);
        assert_eq!(descriptor.reads, vec![velocity]);
        assert_eq!(descriptor.optionals, vec![name]);
        assert_eq!(descriptor.filters, vec![QueryFilter::Without(frozen)]);
        assert!(!descriptor.is_reactive());
        assert_eq!(queries.len(), 1);
    }

    #[test]
    fn test_any_reactive_field_makes_query_reactive() {
        let mut world = make_world();
        let name = world.component_id::<Name>().unwrap();
        let mut queries = QuerySet::new();
        let query = EntityQueryBuilder::new(&mut world, &mut queries)
            .select::<Position>()
            .select::<Name>()
            .added()
            .changed()
            .build()
            .unwrap();

        assert!(query.is_reactive());
        assert_eq!(
            query.descriptor().filters,
            vec![QueryFilter::Added(name), QueryFilter::Changed(name)]
        );
    }

    #[test]
    fn test_reactive_field_is_not_required() {
        let mut world = make_world();
        let mut queries = QuerySet::new();
        let query = EntityQueryBuilder::new(&mut world, &mut queries)
            .select::<Position>()
            .select::<Name>()
            .changed()
            .build()
            .unwrap();

        let e = spawn(&mut world, (Position(0), Name("a")));
        let commands = engine_component::CommandBuffer::new();
        let name = world.component_id::<Name>().unwrap();
        world
            .components()
            .write::<Name>(e, name, &commands)
            .unwrap()
            .0 = "b";
        commands.apply(&mut world).unwrap();

        turn(&mut world, &queries, |_| {
            assert_eq!(query.entities().unwrap(), vec![e]);
        });
    }
}
