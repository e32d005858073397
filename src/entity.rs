use index_pool::IndexPool;
use std::fmt;

/// An entity identifier.
///
/// `index` is a slot number reused after the entity is despawned, `generation` is bumped on
/// every reuse so that stale handles can be told apart from the current occupant of the slot.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    pub const NULL: Self = Entity {
        index: u32::MAX,
        generation: u32::MAX,
    };

    /// Constructs a new entity identifier.
    pub const fn new(index: u32, generation: u32) -> Entity {
        Entity { index, generation }
    }

    /// Returns the slot number of the entity.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Returns the generation of the slot this handle was issued for.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl Default for Entity {
    fn default() -> Self {
        Entity::NULL
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Hands out entity slots, reusing freed ones with a bumped generation.
#[derive(Default)]
pub(crate) struct EntityAllocator {
    slots: IndexPool,
    generations: Vec<u32>,
}

impl EntityAllocator {
    const MAX_ENTITIES: usize = u32::MAX as usize - 1;

    pub fn with_capacity(capacity: usize) -> Self {
        EntityAllocator {
            slots: IndexPool::new(),
            generations: Vec::with_capacity(capacity),
        }
    }

    pub fn allocate(&mut self) -> Entity {
        #[cold]
        #[inline(never)]
        fn assert_failed() -> ! {
            panic!(
                "Out of entity slots. A maximum number of entities ({}) is reached.",
                EntityAllocator::MAX_ENTITIES
            );
        }

        let index = self.slots.new_id();
        if index >= Self::MAX_ENTITIES {
            assert_failed();
        }
        if index >= self.generations.len() {
            self.generations.resize(index + 1, 0);
        }

        Entity::new(index as u32, self.generations[index])
    }

    /// Returns `true` if the entity was alive.
    pub fn free(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let index = entity.index as usize;
        if self.slots.return_id(index).is_err() {
            return false;
        }
        self.generations[index] = self.generations[index].wrapping_add(1);
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        let index = entity.index as usize;
        self.generations
            .get(index)
            .map_or(false, |gen| *gen == entity.generation && !self.slots.is_free(index))
    }

    /// Returns the number of live entities.
    pub fn len(&self) -> usize {
        self.slots.in_use()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reused_slot_bumps_generation() {
        let mut alloc = EntityAllocator::default();
        let e0 = alloc.allocate();
        let e1 = alloc.allocate();
        assert_ne!(e0.index(), e1.index());

        assert!(alloc.free(e0));
        assert!(!alloc.free(e0));
        assert!(!alloc.is_alive(e0));

        let e2 = alloc.allocate();
        assert_eq!(e2.index(), e0.index());
        assert_eq!(e2.generation(), e0.generation() + 1);
        assert!(alloc.is_alive(e2));
        assert!(!alloc.is_alive(e0));
        assert_eq!(alloc.len(), 2);
    }

    #[test]
    fn null_is_never_alive() {
        let mut alloc = EntityAllocator::default();
        alloc.allocate();
        assert!(!alloc.is_alive(Entity::NULL));
        assert_eq!(Entity::default(), Entity::NULL);
    }
}
