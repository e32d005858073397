use crate::entity::Entity;
use crate::event::Event;
use crate::mask::Mask;
use crate::segment::{Segment, SegmentIndex};
use crate::store::{ComponentStore, StoreId};
use crate::view::{Plan, View};
use crossbeam_channel::Receiver;
use std::marker::PhantomData;

struct Member {
    segment: SegmentIndex,
    plan: Plan,
}

/// An incrementally maintained set of the segments whose mask matches a predicate.
///
/// A group scans the segments of a store once when created and then follows the store's
/// events: newly created segments are tested against the predicate, and entity insertions,
/// moves and removals adjust the entity count. A segment is a member if the predicate accepts
/// its mask and it stores every component of the view `V`.
///
/// Events are buffered until the group is observed again, up to
/// [`StoreConfig::group_backlog`](crate::StoreConfig::group_backlog) of them. Once the backlog is
/// full, further events are dropped and the next observation rebuilds the count from the store.
///
/// ```
/// use entity_store::{Component, ComponentStore, Group};
///
/// #[derive(Component)]
/// struct Speed(f32);
///
/// let mut store = ComponentStore::new();
/// let mut group = Group::<&Speed>::all(&mut store);
///
/// let entity = store.spawn();
/// store.set(entity, Speed(2.0)).unwrap();
/// assert_eq!(group.count(&store), 0);
///
/// store.resolve();
/// assert_eq!(group.count(&store), 1);
///
/// let total: f32 = group.iter(&store).map(|(_, speed)| speed.0).sum();
/// assert_eq!(total, 2.0);
/// ```
pub struct Group<V: View = ()> {
    store_id: StoreId,
    predicate: Box<dyn Fn(&Mask) -> bool + Send + Sync>,
    required: Mask,
    members: Vec<Member>,
    by_segment: Vec<Option<usize>>,
    /// Number of store segments tested against the predicate so far.
    scanned: usize,
    count: usize,
    events: Receiver<Event>,
    _view: PhantomData<fn() -> V>,
}

impl<V: View> Group<V> {
    /// Creates a group of the segments of `store` whose mask satisfies `predicate`.
    pub fn new<P>(store: &mut ComponentStore, predicate: P) -> Self
    where
        P: Fn(&Mask) -> bool + Send + Sync + 'static,
    {
        let (sender, events) = crossbeam_channel::bounded(store.config().group_backlog.max(1));
        store.subscribe(sender);

        let mut group = Group {
            store_id: store.id(),
            predicate: Box::new(predicate),
            required: V::requirements(),
            members: Vec::new(),
            by_segment: Vec::new(),
            scanned: 0,
            count: 0,
            events,
            _view: PhantomData,
        };
        group.scan(store);
        group
    }

    /// Creates a group of every segment storing the components of `V`.
    pub fn all(store: &mut ComponentStore) -> Self {
        Self::new(store, |_| true)
    }

    /// Adds the segment to the members if it matches.
    fn admit(&mut self, segment: SegmentIndex, mask: &Mask) {
        if !mask.has_all(&self.required) || !(self.predicate)(mask) {
            return;
        }
        let Some(plan) = V::plan(mask) else {
            return;
        };

        if self.by_segment.len() <= segment.get() {
            self.by_segment.resize(segment.get() + 1, None);
        }
        self.by_segment[segment.get()] = Some(self.members.len());
        self.members.push(Member { segment, plan });
    }

    /// Tests the segments created since the last scan and recounts the member rows.
    fn scan(&mut self, store: &ComponentStore) {
        let segments = store.segments();
        for segment in &segments[self.scanned..] {
            self.admit(segment.index(), segment.mask());
        }
        self.scanned = segments.len();
        self.count = self
            .members
            .iter()
            .map(|member| segments[member.segment.get()].len())
            .sum();
    }

    fn is_member(&self, segment: SegmentIndex) -> bool {
        matches!(self.by_segment.get(segment.get()), Some(Some(_)))
    }

    fn apply(&mut self, event: Event) {
        match event {
            Event::SegmentCreated { segment, mask } => {
                if segment.get() >= self.scanned {
                    self.admit(segment, &mask);
                    self.scanned = segment.get() + 1;
                }
            }
            Event::EntityInserted { location, .. } => {
                if self.is_member(location.segment) {
                    self.count += 1;
                }
            }
            Event::EntityMoved { source, target, .. } => {
                if self.is_member(source.segment) {
                    self.count -= 1;
                }
                if self.is_member(target.segment) {
                    self.count += 1;
                }
            }
            Event::EntityRemoved { location, .. } => {
                if self.is_member(location.segment) {
                    self.count -= 1;
                }
            }
        }
    }

    /// Brings the group up to date with `store`.
    fn sync(&mut self, store: &ComponentStore) {
        assert_eq!(
            self.store_id,
            store.id(),
            "group used with a store other than the one it was created for"
        );

        if self.events.is_full() {
            // Events past the backlog were dropped.
            while self.events.try_recv().is_ok() {}
            tracing::debug!(
                backlog = ?self.events.capacity(),
                "group backlog overflowed, rescanning"
            );
            self.scan(store);
            return;
        }
        while let Ok(event) = self.events.try_recv() {
            self.apply(event);
        }
    }

    /// Returns the number of events waiting for the next observation.
    pub fn backlog(&self) -> usize {
        self.events.len()
    }

    /// Returns the number of entities in the member segments.
    pub fn count(&mut self, store: &ComponentStore) -> usize {
        self.sync(store);
        self.count
    }

    /// Returns `true` if the entity currently lives in a member segment.
    pub fn has(&mut self, store: &ComponentStore, entity: Entity) -> bool {
        self.sync(store);
        store
            .location(entity)
            .map_or(false, |location| self.is_member(location.segment))
    }

    /// Returns the member segments in the order they joined the group.
    pub fn segments(&mut self, store: &ComponentStore) -> impl Iterator<Item = SegmentIndex> + '_ {
        self.sync(store);
        self.members.iter().map(|member| member.segment)
    }

    /// Iterates `(entity, item)` pairs of every member segment in segment order, then row order.
    pub fn iter<'a>(&'a mut self, store: &'a ComponentStore) -> GroupIter<'a, V> {
        self.sync(store);
        GroupIter {
            segments: store.segments(),
            members: self.members.iter(),
            current: None,
            row: 0,
        }
    }

    /// Calls `f` for each `(entity, item)` pair, visiting member segments in parallel.
    #[cfg(feature = "rayon")]
    pub fn par_for_each<F>(&mut self, store: &ComponentStore, f: F)
    where
        F: for<'a> Fn(Entity, V::Item<'a>) + Send + Sync,
    {
        use rayon::prelude::*;

        self.sync(store);
        let segments = store.segments();
        self.members.par_iter().for_each(|member| {
            let segment = &segments[member.segment.get()];
            let fetch = V::fetch(segment, &member.plan);
            for (row, entity) in segment.entities().iter().enumerate() {
                f(*entity, V::get(fetch, row));
            }
        });
    }
}

/// An iterator over the entities of a [`Group`].
pub struct GroupIter<'a, V: View> {
    segments: &'a [Segment],
    members: std::slice::Iter<'a, Member>,
    current: Option<(&'a [Entity], V::Fetch<'a>)>,
    row: usize,
}

impl<'a, V: View> Iterator for GroupIter<'a, V> {
    type Item = (Entity, V::Item<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((entities, fetch)) = self.current {
                if self.row < entities.len() {
                    let row = self.row;
                    self.row += 1;
                    return Some((entities[row], V::get(fetch, row)));
                }
            }

            let member = self.members.next()?;
            let segment = &self.segments[member.segment.get()];
            self.current = Some((segment.entities(), V::fetch(segment, &member.plan)));
            self.row = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ComponentRegistry;
    use crate::{Component, StoreConfig};

    #[derive(Component, Debug, PartialEq)]
    struct Health(u32);

    #[derive(Component)]
    struct Frozen;

    fn brute_count<V: View>(store: &ComponentStore, predicate: impl Fn(&Mask) -> bool) -> usize {
        let required = V::requirements();
        store
            .segments()
            .iter()
            .filter(|s| s.mask().has_all(&required) && predicate(s.mask()))
            .map(|s| s.len())
            .sum()
    }

    #[test]
    fn count_follows_resolve() {
        let mut store = ComponentStore::new();
        let frozen = ComponentRegistry::index_of::<Frozen>();
        let mut group = Group::<&Health>::new(&mut store, move |mask| !mask.has(frozen.get()));

        let entities = store.spawn_batch(4);
        for (i, e) in entities.iter().enumerate() {
            store.set(*e, Health(i as u32)).unwrap();
        }
        store.resolve();
        assert_eq!(group.count(&store), 4);

        // One entity leaves and one joins a member segment within the same resolve.
        store.set(entities[0], Frozen).unwrap();
        store.remove::<Health>(entities[1]).unwrap();
        let newcomer = store.spawn();
        store.set(newcomer, Health(10)).unwrap();
        store.resolve();

        assert_eq!(group.count(&store), 3);
        assert_eq!(
            group.count(&store),
            brute_count::<&Health>(&store, |mask| !mask.has(frozen.get()))
        );
        assert!(!group.has(&store, entities[0]));
        assert!(!group.has(&store, entities[1]));
        assert!(group.has(&store, newcomer));
    }

    #[test]
    fn existing_segments_are_scanned() {
        let mut store = ComponentStore::new();
        let e = store.spawn();
        store.set(e, Health(1)).unwrap();
        store.resolve();

        let mut group = Group::<&Health>::all(&mut store);
        assert_eq!(group.count(&store), 1);
        assert_eq!(group.segments(&store).count(), 1);

        store.despawn(e);
        assert_eq!(group.count(&store), 0);
    }

    #[test]
    fn empty_mask_group_counts_spawned_entities() {
        let mut store = ComponentStore::new();
        let mut group = Group::<()>::new(&mut store, |mask| mask.is_empty());

        let entities = store.spawn_batch(3);
        assert_eq!(group.count(&store), 3);

        store.set(entities[0], Health(0)).unwrap();
        store.resolve();
        assert_eq!(group.count(&store), 2);

        store.despawn(entities[1]);
        assert_eq!(group.count(&store), 1);
        let remaining: Vec<_> = group.iter(&store).map(|(e, ())| e).collect();
        assert_eq!(remaining, vec![entities[2]]);
    }

    #[test]
    fn iteration_visits_every_member_row() {
        let mut store = ComponentStore::new();
        let mut group = Group::<&Health>::all(&mut store);
        let entities = store.spawn_batch(5);
        for (i, e) in entities.iter().enumerate() {
            store.set(*e, Health(i as u32)).unwrap();
            if i % 2 == 0 {
                store.set(*e, Frozen).unwrap();
            }
        }
        store.resolve();

        let mut seen: Vec<_> = group.iter(&store).map(|(e, h)| (e, h.0)).collect();
        seen.sort();
        let expected: Vec<_> = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (*e, i as u32))
            .collect();
        assert_eq!(seen, expected);
        assert_eq!(group.segments(&store).count(), 2);
    }

    #[test]
    fn unobserved_backlog_stays_bounded() {
        let mut store = ComponentStore::with_config(StoreConfig::default().with_group_backlog(4));
        let mut group = Group::<&Health>::all(&mut store);

        let kept = store.spawn_batch(3);
        for e in &kept {
            store.set(*e, Health(0)).unwrap();
        }
        store.resolve();

        for i in 0..1000 {
            let e = store.spawn();
            store.set(e, Health(i)).unwrap();
            store.resolve();
            store.despawn(e);
            assert!(group.backlog() <= 4);
        }

        assert_eq!(group.count(&store), 3);
        assert_eq!(group.count(&store), brute_count::<&Health>(&store, |_| true));
        assert_eq!(group.backlog(), 0);
    }

    #[test]
    fn overflowed_group_admits_new_segments() {
        let mut store = ComponentStore::with_config(StoreConfig::default().with_group_backlog(1));
        let mut group = Group::<&Health>::all(&mut store);

        let entities = store.spawn_batch(3);
        for e in &entities {
            store.set(*e, Health(1)).unwrap();
        }
        store.set(entities[0], Frozen).unwrap();
        store.resolve();

        assert_eq!(group.count(&store), 3);
        assert_eq!(group.segments(&store).count(), 2);
        assert!(group.has(&store, entities[0]));

        store.despawn(entities[1]);
        assert_eq!(group.count(&store), 2);
        let total: u32 = group.iter(&store).map(|(_, health)| health.0).sum();
        assert_eq!(total, 2);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn par_for_each_visits_every_member_row() {
        use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

        let mut store = ComponentStore::new();
        let mut group = Group::<&Health>::all(&mut store);
        let entities = store.spawn_batch(100);
        for (i, e) in entities.iter().enumerate() {
            store.set(*e, Health(i as u32)).unwrap();
            if i % 3 == 0 {
                store.set(*e, Frozen).unwrap();
            }
        }
        store.resolve();

        let visited = AtomicUsize::new(0);
        let sum = AtomicU32::new(0);
        group.par_for_each(&store, |_, health: &Health| {
            visited.fetch_add(1, Ordering::Relaxed);
            sum.fetch_add(health.0, Ordering::Relaxed);
        });

        assert_eq!(visited.into_inner(), 100);
        assert_eq!(sum.into_inner(), (0..100).sum::<u32>());
    }

    #[test]
    #[should_panic(expected = "other than the one")]
    fn foreign_store_count_is_rejected() {
        let mut store = ComponentStore::new();
        let other = ComponentStore::new();
        let mut group = Group::<()>::all(&mut store);
        group.count(&other);
    }

    #[test]
    #[should_panic(expected = "other than the one")]
    fn foreign_store_is_rejected() {
        let mut store = ComponentStore::new();
        let other = ComponentStore::new();
        let mut group = Group::<()>::all(&mut store);
        group.iter(&other).count();
    }
}
