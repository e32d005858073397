use crate::component::Component;
use crate::entity::Entity;
use crate::mask::Mask;
use crate::registry::ComponentIndex;
use crate::segment::column::{typed_mut, Column};
use crate::HashMap;
use downcast_rs::{impl_downcast, Downcast};

/// Number of staged values per chunk.
pub(crate) const CHUNK_SIZE: usize = 8;

/// A pending structural change of one entity.
pub(crate) struct TransientEntry {
    pub entity: Entity,
    /// Working copy of the entity's component set.
    pub mask: Mask,
}

/// Type-erased staging storage of one component type, addressed by transient index.
pub(crate) trait StagingColumn: Downcast + Send + Sync {
    /// Drops the staged values of the first `len` transient entries.
    fn clear(&mut self, len: usize);

    /// Moves the value staged at `slot` to the end of `target`.
    /// Returns `false` if nothing is staged there.
    fn take_into(&mut self, slot: usize, target: &mut dyn Column) -> bool;
}
impl_downcast!(StagingColumn);

type Chunk<C> = Box<[Option<C>; CHUNK_SIZE]>;

/// Fixed-size chunks of staged `C` values. Chunks are boxed, so growing the chunk table never
/// moves values which are already staged.
pub(crate) struct StagingChunks<C> {
    chunks: Vec<Chunk<C>>,
}

impl<C> Default for StagingChunks<C> {
    fn default() -> Self {
        StagingChunks { chunks: Vec::new() }
    }
}

impl<C: Component> StagingChunks<C> {
    #[inline]
    fn split(slot: usize) -> (usize, usize) {
        (slot / CHUNK_SIZE, slot % CHUNK_SIZE)
    }

    /// Returns the staging cell of `slot`, allocating its chunk if necessary.
    fn cell(&mut self, slot: usize) -> &mut Option<C> {
        let (chunk, offset) = Self::split(slot);
        while self.chunks.len() <= chunk {
            self.chunks.push(Box::new(std::array::from_fn(|_| None)));
        }
        &mut self.chunks[chunk][offset]
    }

    fn get(&self, slot: usize) -> Option<&C> {
        let (chunk, offset) = Self::split(slot);
        self.chunks.get(chunk)?[offset].as_ref()
    }

    fn get_mut(&mut self, slot: usize) -> Option<&mut C> {
        let (chunk, offset) = Self::split(slot);
        self.chunks.get_mut(chunk)?[offset].as_mut()
    }
}

impl<C: Component> StagingColumn for StagingChunks<C> {
    fn clear(&mut self, len: usize) {
        let used = (len + CHUNK_SIZE - 1) / CHUNK_SIZE;
        for chunk in self.chunks.iter_mut().take(used) {
            chunk.iter_mut().for_each(|cell| *cell = None);
        }
    }

    fn take_into(&mut self, slot: usize, target: &mut dyn Column) -> bool {
        let (chunk, offset) = Self::split(slot);
        let Some(value) = self.chunks.get_mut(chunk).and_then(|c| c[offset].take()) else {
            return false;
        };
        typed_mut::<C>(target).push(value);
        true
    }
}

/// Side table of pending structural changes.
///
/// Entries are only appended until [`reset`](Self::reset), which keeps their storage so
/// that the next frame reuses it.
#[derive(Default)]
pub(crate) struct TransientBuffer {
    entries: Vec<TransientEntry>,
    len: usize,
    live: usize,
    staging: HashMap<ComponentIndex, Box<dyn StagingColumn>>,
}

impl TransientBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        TransientBuffer {
            entries: Vec::with_capacity(capacity),
            len: 0,
            live: 0,
            staging: Default::default(),
        }
    }

    /// Opens a new entry for `entity` seeded with a copy of `current` and returns its index.
    pub fn reserve(&mut self, entity: Entity, current: &Mask) -> usize {
        let index = self.len;
        if let Some(entry) = self.entries.get_mut(index) {
            entry.entity = entity;
            entry.mask.clone_from(current);
        } else {
            self.entries.push(TransientEntry {
                entity,
                mask: current.clone(),
            });
        }
        self.len += 1;
        self.live += 1;
        index
    }

    /// Returns the number of open entries, retired ones included.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns the number of open entries which were not retired.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Detaches entry `index` from its entity. Resolve skips retired entries.
    pub fn retire(&mut self, index: usize) {
        debug_assert!(index < self.len);
        let entry = &mut self.entries[index];
        if entry.entity != Entity::NULL {
            entry.entity = Entity::NULL;
            self.live -= 1;
        }
    }

    pub fn entry(&self, index: usize) -> &TransientEntry {
        debug_assert!(index < self.len);
        &self.entries[index]
    }

    pub fn entry_mut(&mut self, index: usize) -> &mut TransientEntry {
        debug_assert!(index < self.len);
        &mut self.entries[index]
    }

    /// Stages `value` as the new component `component` of entry `index`, replacing any value
    /// staged there before.
    pub fn stage<C: Component>(&mut self, index: usize, component: ComponentIndex, value: C) {
        let staging = self
            .staging
            .entry(component)
            .or_insert_with(|| Box::new(StagingChunks::<C>::default()));
        match staging.downcast_mut::<StagingChunks<C>>() {
            Some(chunks) => *chunks.cell(index) = Some(value),
            None => crate::segment::column::column_type_mismatch(std::any::type_name::<C>()),
        }
    }

    fn chunks<C: Component>(&self, component: ComponentIndex) -> Option<&StagingChunks<C>> {
        self.staging.get(&component)?.downcast_ref::<StagingChunks<C>>()
    }

    /// Returns the value staged for entry `index`.
    pub fn staged<C: Component>(&self, index: usize, component: ComponentIndex) -> Option<&C> {
        self.chunks::<C>(component)?.get(index)
    }

    pub fn is_staged<C: Component>(&self, index: usize, component: ComponentIndex) -> bool {
        self.staged::<C>(index, component).is_some()
    }

    pub fn staged_mut<C: Component>(
        &mut self,
        index: usize,
        component: ComponentIndex,
    ) -> Option<&mut C> {
        self.staging
            .get_mut(&component)?
            .downcast_mut::<StagingChunks<C>>()?
            .get_mut(index)
    }

    /// Moves the value staged for entry `index` to the end of `target`.
    pub fn take_staged_into(
        &mut self,
        index: usize,
        component: ComponentIndex,
        target: &mut dyn Column,
    ) -> bool {
        self.staging
            .get_mut(&component)
            .map_or(false, |staging| staging.take_into(index, target))
    }

    /// Closes every entry, dropping values that were staged but never consumed.
    pub fn reset(&mut self) {
        for entry in &mut self.entries[..self.len] {
            entry.entity = Entity::NULL;
            entry.mask.clear();
        }
        for staging in self.staging.values_mut() {
            staging.clear(self.len);
        }
        self.len = 0;
        self.live = 0;
    }
}
