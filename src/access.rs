//! Access classification for schedulers.
//!
//! Operations on a store either read component values, write them in place, or change the
//! component set of an entity. A scheduler declares the accesses of each job as an
//! [`AccessSet`] and runs jobs whose sets do not conflict side by side.

use crate::component::Component;
use crate::entity::Entity;
use crate::registry::{ComponentIndex, ComponentRegistry};
use crate::store::ComponentStore;
use crate::HashMap;
use std::collections::hash_map;

/// A store operation on one component of one entity.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Operation {
    Get,
    Set,
    Remove,
    Clear,
}

/// How an operation touches a component type. Ordered from weakest to strongest.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Access {
    /// Values are only read.
    Read,
    /// The component set changes. Segment memory is untouched until the next resolve.
    Structural,
    /// Values in segment memory are overwritten.
    Write,
}

impl ComponentStore {
    /// Classifies `operation` on component `C` of `entity` in the store's current state.
    ///
    /// `Set` of a component which the entity's current segment stores writes in place; any
    /// other mutation is structural.
    pub fn access_of<C: Component>(&self, entity: Entity, operation: Operation) -> Access {
        match operation {
            Operation::Get => Access::Read,
            Operation::Set => {
                let in_place = self.location(entity).map_or(false, |location| {
                    self.segments()[location.segment.get()].has_component::<C>()
                });
                if in_place {
                    Access::Write
                } else {
                    Access::Structural
                }
            }
            Operation::Remove | Operation::Clear => Access::Structural,
        }
    }
}

/// Component types a job touches together with the strongest access to each of them.
#[derive(Debug, Default, Clone)]
pub struct AccessSet {
    components: HashMap<ComponentIndex, Access>,
}

impl AccessSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `access` to `C`.
    pub fn with<C: Component>(mut self, access: Access) -> Self {
        self.insert(ComponentRegistry::index_of::<C>(), access);
        self
    }

    /// Declares read access to `C`.
    pub fn read<C: Component>(self) -> Self {
        self.with::<C>(Access::Read)
    }

    /// Declares in-place write access to `C`.
    pub fn write<C: Component>(self) -> Self {
        self.with::<C>(Access::Write)
    }

    /// Declares structural access to `C`.
    pub fn structural<C: Component>(self) -> Self {
        self.with::<C>(Access::Structural)
    }

    /// Records `access` to the component, keeping the stronger one if it is already present.
    pub fn insert(&mut self, component: ComponentIndex, access: Access) {
        match self.components.entry(component) {
            hash_map::Entry::Occupied(mut e) => {
                if *e.get() < access {
                    e.insert(access);
                }
            }
            hash_map::Entry::Vacant(e) => {
                e.insert(access);
            }
        }
    }

    pub fn get(&self, component: ComponentIndex) -> Option<Access> {
        self.components.get(&component).copied()
    }

    /// Adds the accesses of `other`.
    pub fn merge(&mut self, other: &AccessSet) {
        self.components.reserve(other.components.len());
        for (component, access) in &other.components {
            self.insert(*component, *access);
        }
    }

    /// Returns `true` if both sets touch a common component and one of them writes its values.
    ///
    /// Structural access does not conflict with reads: pending structural changes become
    /// visible only at the next resolve.
    pub fn conflicts_with(&self, other: &AccessSet) -> bool {
        self.components.iter().any(|(component, a)| {
            other
                .components
                .get(component)
                .map_or(false, |b| *a == Access::Write || *b == Access::Write)
        })
    }
}
