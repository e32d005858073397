mod transient;

use crate::component::{Component, ComponentMeta};
use crate::config::StoreConfig;
use crate::entity::{Entity, EntityAllocator};
use crate::error::{ComponentError, StoreError};
use crate::event::{Event, EventSender, Subscribers};
use crate::mask::Mask;
use crate::registry::{ComponentIndex, ComponentRegistry};
use crate::segment::{Location, Segment, SegmentIndex};
use crate::HashMap;
use std::any::TypeId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use transient::TransientBuffer;

/// A unique identifier of a store instance.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct StoreId(u64);

impl StoreId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        StoreId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Pending {
    None,
    /// Index of the entity's entry in the transient buffer.
    Transient(usize),
}

#[derive(Debug, Copy, Clone)]
struct EntityRecord {
    location: Location,
    pending: Pending,
}

/// A container of entities and their components.
///
/// Entities with the same set of components share a [`Segment`]. Adding or removing a component
/// does not move the entity right away: the change is recorded and applied by the next
/// [`resolve`](Self::resolve), so segments stay stable until then. Writing a component which the
/// entity already has is applied in place immediately.
///
/// ```
/// use entity_store::{Component, ComponentStore};
///
/// #[derive(Component, Debug, PartialEq)]
/// struct Health(u32);
///
/// let mut store = ComponentStore::new();
/// let entity = store.spawn();
///
/// assert_eq!(store.set(entity, Health(10)), Ok(true));
/// assert_eq!(store.get::<Health>(entity), Ok(&Health(10)));
///
/// store.resolve();
/// assert!(store.has::<Health>(entity));
/// ```
pub struct ComponentStore {
    id: StoreId,
    config: StoreConfig,
    entities: EntityAllocator,
    records: Vec<Option<EntityRecord>>,
    segments: Vec<Segment>,
    segments_by_mask: HashMap<Mask, SegmentIndex>,
    transient: TransientBuffer,
    subscribers: Subscribers,
}

impl ComponentStore {
    /// Creates an empty `ComponentStore`.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates an empty `ComponentStore` with the given configuration.
    pub fn with_config(config: StoreConfig) -> Self {
        let mut store = ComponentStore {
            id: StoreId::next(),
            entities: EntityAllocator::with_capacity(config.entity_capacity),
            records: Vec::with_capacity(config.entity_capacity),
            segments: Vec::new(),
            segments_by_mask: Default::default(),
            transient: TransientBuffer::with_capacity(config.transient_capacity),
            subscribers: Default::default(),
            config,
        };
        let empty = Self::get_or_create_segment(
            &mut store.segments,
            &mut store.segments_by_mask,
            &mut store.subscribers,
            store.config.segment_capacity,
            &Mask::new(),
        );
        debug_assert_eq!(empty, SegmentIndex::EMPTY);
        store
    }

    pub fn id(&self) -> StoreId {
        self.id
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Registers a listener of store events.
    pub fn subscribe<S: EventSender + 'static>(&mut self, sender: S) {
        self.subscribers.push(Box::new(sender));
    }

    fn get_or_create_segment(
        segments: &mut Vec<Segment>,
        segments_by_mask: &mut HashMap<Mask, SegmentIndex>,
        subscribers: &mut Subscribers,
        capacity: usize,
        mask: &Mask,
    ) -> SegmentIndex {
        if let Some(index) = segments_by_mask.get(mask) {
            return *index;
        }

        // The key is a private copy: the caller's mask is a working copy that keeps changing.
        let mask = mask.clone();
        let index = SegmentIndex::new(segments.len());
        segments.push(Segment::new(index, mask.clone(), capacity));
        segments_by_mask.insert(mask.clone(), index);

        tracing::debug!(segment = index.get(), ?mask, "created segment");
        subscribers.send_with(|| Event::SegmentCreated {
            segment: index,
            mask,
        });
        index
    }

    fn record(&self, entity: Entity) -> Option<&EntityRecord> {
        if !self.entities.is_alive(entity) {
            return None;
        }
        self.records.get(entity.index() as usize)?.as_ref()
    }

    fn record_mut(&mut self, entity: Entity) -> Option<&mut EntityRecord> {
        if !self.entities.is_alive(entity) {
            return None;
        }
        self.records.get_mut(entity.index() as usize)?.as_mut()
    }

    /// Returns the record of an entity which is about to be mutated.
    fn live_record(&self, entity: Entity) -> Result<EntityRecord, StoreError> {
        match self.record(entity) {
            Some(record) => Ok(*record),
            None => {
                tracing::warn!(%entity, "attempt to mutate a dead entity");
                Err(StoreError::NoSuchEntity(entity))
            }
        }
    }

    fn place(&mut self, entity: Entity, location: Location) {
        let index = entity.index() as usize;
        if index >= self.records.len() {
            self.records.resize(index + 1, None);
        }
        self.records[index] = Some(EntityRecord {
            location,
            pending: Pending::None,
        });
    }

    /// Creates a new entity without components and returns its identifier.
    pub fn spawn(&mut self) -> Entity {
        let entity = self.entities.allocate();
        let row = self.segments[SegmentIndex::EMPTY.get()].add(&[entity], |_, _| {});
        let location = Location {
            segment: SegmentIndex::EMPTY,
            index: row,
        };
        self.place(entity, location);
        self.subscribers
            .send_with(|| Event::EntityInserted { entity, location });
        entity
    }

    /// Creates `count` new entities without components.
    pub fn spawn_batch(&mut self, count: usize) -> Vec<Entity> {
        let entities: Vec<_> = (0..count).map(|_| self.entities.allocate()).collect();
        let start = self.segments[SegmentIndex::EMPTY.get()].add(&entities, |_, _| {});

        for (offset, entity) in entities.iter().enumerate() {
            let location = Location {
                segment: SegmentIndex::EMPTY,
                index: start + offset,
            };
            self.place(*entity, location);
            self.subscribers.send_with(|| Event::EntityInserted {
                entity: *entity,
                location,
            });
        }
        entities
    }

    /// Removes an entity and all of its components right away.
    /// Returns `true` if the entity was alive.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        let Some(record) = self.record(entity).copied() else {
            return false;
        };
        let location = record.location;

        if let Some(displaced) = self.segments[location.segment.get()].remove(location.index) {
            if let Some(displaced) = self.record_mut(displaced) {
                displaced.location.index = location.index;
            }
        }
        if let Pending::Transient(t) = record.pending {
            self.transient.retire(t);
        }
        self.records[entity.index() as usize] = None;
        self.entities.free(entity);

        self.subscribers
            .send_with(|| Event::EntityRemoved { entity, location });
        true
    }

    /// Returns `true` if the entity is alive.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.record(entity).is_some()
    }

    /// Returns the number of live entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current row of an entity.
    ///
    /// The row is where the entity's data physically lives. It does not reflect changes
    /// pending until the next [`resolve`](Self::resolve).
    pub fn location(&self, entity: Entity) -> Option<Location> {
        self.record(entity).map(|record| record.location)
    }

    fn mask_of_record(&self, record: &EntityRecord) -> &Mask {
        match record.pending {
            Pending::Transient(t) => &self.transient.entry(t).mask,
            Pending::None => self.segments[record.location.segment.get()].mask(),
        }
    }

    /// Returns the component set of an entity including pending changes.
    pub fn effective_mask(&self, entity: Entity) -> Option<&Mask> {
        let record = self.record(entity)?;
        Some(self.mask_of_record(record))
    }

    /// Returns `true` if a structural change of the entity waits for the next resolve.
    pub fn has_pending(&self, entity: Entity) -> bool {
        self.record(entity)
            .map_or(false, |record| record.pending != Pending::None)
    }

    /// Returns the number of entities with pending structural changes.
    pub fn pending_len(&self) -> usize {
        self.transient.live()
    }

    /// Returns all segments in creation order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, index: SegmentIndex) -> Option<&Segment> {
        self.segments.get(index.get())
    }

    /// Returns the segment storing exactly the component set `mask`.
    pub fn segment_for(&self, mask: &Mask) -> Option<&Segment> {
        let index = self.segments_by_mask.get(mask)?;
        self.segments.get(index.get())
    }

    /// Returns the mutable values of component `C` of a segment.
    pub fn column_mut<C: Component>(&mut self, segment: SegmentIndex) -> Option<&mut [C]> {
        self.segments.get_mut(segment.get())?.column_mut::<C>()
    }

    /// Returns the metadata of component `C`, registering it if necessary.
    pub fn metadata<C: Component>(&self) -> Arc<ComponentMeta> {
        ComponentRegistry::register::<C>()
    }

    /// Returns the metadata of a registered component type.
    pub fn try_get_metadata(&self, type_id: TypeId) -> Option<Arc<ComponentMeta>> {
        ComponentRegistry::try_get_metadata(type_id)
    }

    /// Returns `true` if the entity has component `C`, taking pending changes into account.
    pub fn has<C: Component>(&self, entity: Entity) -> bool {
        let Some(index) = ComponentRegistry::lookup::<C>() else {
            return false;
        };
        self.effective_mask(entity)
            .map_or(false, |mask| mask.has(index.get()))
    }

    /// Returns a reference to the component `C` of the specified entity.
    ///
    /// A component added since the last resolve is read from where it was staged. A component
    /// removed since the last resolve is reported missing.
    pub fn get<C: Component>(&self, entity: Entity) -> Result<&C, ComponentError> {
        let record = self
            .record(entity)
            .ok_or(ComponentError::NoSuchEntity(entity))?;
        let index =
            ComponentRegistry::lookup::<C>().ok_or_else(|| ComponentError::missing::<C>(entity))?;

        if let Pending::Transient(t) = record.pending {
            if !self.transient.entry(t).mask.has(index.get()) {
                return Err(ComponentError::missing::<C>(entity));
            }
            if let Some(value) = self.transient.staged::<C>(t, index) {
                return Ok(value);
            }
        }

        let location = record.location;
        self.segments[location.segment.get()]
            .column_by_index::<C>(index)
            .and_then(|column| column.get(location.index))
            .ok_or_else(|| ComponentError::missing::<C>(entity))
    }

    /// Returns a mutable reference to the component `C` of the specified entity.
    /// Follows the same rules as [`get`](Self::get).
    pub fn get_mut<C: Component>(&mut self, entity: Entity) -> Result<&mut C, ComponentError> {
        let record = *self
            .record(entity)
            .ok_or(ComponentError::NoSuchEntity(entity))?;
        let index =
            ComponentRegistry::lookup::<C>().ok_or_else(|| ComponentError::missing::<C>(entity))?;

        if let Pending::Transient(t) = record.pending {
            if !self.transient.entry(t).mask.has(index.get()) {
                return Err(ComponentError::missing::<C>(entity));
            }
            if self.transient.is_staged::<C>(t, index) {
                return self
                    .transient
                    .staged_mut::<C>(t, index)
                    .ok_or_else(|| ComponentError::missing::<C>(entity));
            }
        }

        let location = record.location;
        self.segments[location.segment.get()]
            .column_by_index_mut::<C>(index)
            .and_then(|column| column.get_mut(location.index))
            .ok_or_else(|| ComponentError::missing::<C>(entity))
    }

    /// Calls `f` with the component `C` of the specified entity and returns its result.
    pub fn with_mut<C, R, F>(&mut self, entity: Entity, f: F) -> Result<R, ComponentError>
    where
        C: Component,
        F: FnOnce(&mut C) -> R,
    {
        self.get_mut::<C>(entity).map(f)
    }

    /// Returns the transient entry of the entity, opening one if necessary.
    fn reserve_transient(&mut self, entity: Entity, record: EntityRecord) -> usize {
        if let Pending::Transient(t) = record.pending {
            return t;
        }
        let current = self.segments[record.location.segment.get()].mask();
        let t = self.transient.reserve(entity, current);
        if let Some(record) = self.record_mut(entity) {
            record.pending = Pending::Transient(t);
        }
        t
    }

    /// Sets the component `C` of the specified entity.
    ///
    /// If the entity's current segment stores `C`, the value is written in place. Otherwise the
    /// value is staged and the entity moves to the matching segment on the next resolve.
    /// Returns `true` if the component was not present before.
    pub fn set<C: Component>(&mut self, entity: Entity, value: C) -> Result<bool, StoreError> {
        let record = self.live_record(entity)?;
        let index = ComponentRegistry::index_of::<C>();
        let location = record.location;

        if let Some(column) =
            self.segments[location.segment.get()].column_by_index_mut::<C>(index)
        {
            column[location.index] = value;
            return Ok(match record.pending {
                // A removal of `C` may be pending; writing the value cancels it.
                Pending::Transient(t) => self.transient.entry_mut(t).mask.add(index.get()),
                Pending::None => false,
            });
        }

        let t = self.reserve_transient(entity, record);
        let added = self.transient.entry_mut(t).mask.add(index.get());
        self.transient.stage(t, index, value);
        Ok(added)
    }

    /// Removes the component `C` from the specified entity on the next resolve.
    /// Returns `true` if the entity had the component.
    pub fn remove<C: Component>(&mut self, entity: Entity) -> Result<bool, StoreError> {
        let record = self.live_record(entity)?;
        let Some(index) = ComponentRegistry::lookup::<C>() else {
            return Ok(false);
        };
        if !self.mask_of_record(&record).has(index.get()) {
            return Ok(false);
        }

        let t = self.reserve_transient(entity, record);
        Ok(self.transient.entry_mut(t).mask.remove(index.get()))
    }

    /// Removes all components from the specified entity on the next resolve.
    /// Returns `true` if the entity had any component.
    pub fn clear(&mut self, entity: Entity) -> Result<bool, StoreError> {
        let record = self.live_record(entity)?;
        if self.mask_of_record(&record).is_empty() {
            return Ok(false);
        }

        let t = self.reserve_transient(entity, record);
        Ok(self.transient.entry_mut(t).mask.clear())
    }

    /// Applies all pending structural changes, moving each changed entity to the segment of its
    /// new component set. Returns the number of moved entities.
    pub fn resolve(&mut self) -> usize {
        let _span = tracing::debug_span!("resolve", pending = self.transient.len()).entered();
        let mut moved = 0;
        let mut skipped = 0;

        for t in 0..self.transient.len() {
            let entity = self.transient.entry(t).entity;
            let Some(record) = self.record_mut(entity) else {
                skipped += 1;
                continue;
            };
            if record.pending != Pending::Transient(t) {
                skipped += 1;
                continue;
            }
            record.pending = Pending::None;
            let source = record.location;

            let mask = &self.transient.entry(t).mask;
            if self.segments[source.segment.get()].mask() == mask {
                skipped += 1;
                continue;
            }
            let target = Self::get_or_create_segment(
                &mut self.segments,
                &mut self.segments_by_mask,
                &mut self.subscribers,
                self.config.segment_capacity,
                mask,
            );

            self.migrate(entity, source, target, t);
            moved += 1;
        }

        self.transient.reset();
        tracing::debug!(moved, skipped, "resolved pending changes");
        moved
    }

    /// Moves an entity from `source` to the end of segment `target`, carrying over the
    /// components both segments share and taking newly added ones from transient entry `t`.
    fn migrate(&mut self, entity: Entity, source: Location, target: SegmentIndex, t: usize) {
        let (src, dst) = pair_mut(&mut self.segments, source.segment.get(), target.get());
        let transient = &mut self.transient;
        let row = source.index;

        let target_row = dst.add(&[entity], |component, column| {
            if !src.transfer(component, row, column)
                && !transient.take_staged_into(t, component, column)
            {
                panic!(
                    "entity {} gained component {} without a staged value",
                    entity, component
                );
            }
        });
        let displaced = src.remove_row(row, dst.mask());

        if let Some(displaced) = displaced {
            if let Some(record) = self.record_mut(displaced) {
                record.location.index = row;
            }
        }
        let target = Location {
            segment: target,
            index: target_row,
        };
        if let Some(record) = self.record_mut(entity) {
            record.location = target;
        }

        tracing::trace!(%entity, ?source, ?target, "moved entity");
        self.subscribers.send_with(|| Event::EntityMoved {
            entity,
            source,
            target,
        });
    }
}

impl Default for ComponentStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns mutable references to two distinct elements.
fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    assert_ne!(a, b, "pair_mut requires distinct indices");
    if a < b {
        let (left, right) = items.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = items.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}
