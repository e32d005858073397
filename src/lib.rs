//! An archetype storage engine for entity component data.
//!
//! An entity is an opaque identifier for an object, and each entity can have any set of
//! components associated with it. Entities with the same set of components share a
//! [`Segment`], where every component type is stored in its own contiguous column.
//!
//! Adding or removing components does not move an entity right away. The change is recorded
//! and applied by [`ComponentStore::resolve`], so segments stay stable while they are read
//! during a frame. A [`Group`] follows the segments whose component set matches a predicate
//! and iterates their entities.
//!
//! # Examples
//!
//! ```
//! use entity_store::{Component, ComponentStore, Group};
//!
//! #[derive(Component, Debug, PartialEq)]
//! struct Position {
//!     x: f32,
//!     y: f32,
//! }
//!
//! #[derive(Component)]
//! struct Barks {
//!     bark_sound: String,
//! }
//!
//! let mut store = ComponentStore::new();
//! let mut barking = Group::<(&Position, &Barks)>::all(&mut store);
//!
//! let dog = store.spawn();
//! store.set(dog, Position { x: 1.0, y: 2.0 }).unwrap();
//! store.set(dog, Barks { bark_sound: "bark.ogg".to_string() }).unwrap();
//!
//! let bird = store.spawn();
//! store.set(bird, Position { x: 0.0, y: 9.0 }).unwrap();
//!
//! // Pending until resolved, but already readable.
//! assert_eq!(store.get::<Position>(dog), Ok(&Position { x: 1.0, y: 2.0 }));
//! assert_eq!(barking.count(&store), 0);
//!
//! store.resolve();
//! assert_eq!(barking.count(&store), 1);
//!
//! for (entity, (position, barks)) in barking.iter(&store) {
//!     assert_eq!(entity, dog);
//!     assert_eq!(position.y, 2.0);
//!     assert_eq!(barks.bark_sound, "bark.ogg");
//! }
//!
//! store.get_mut::<Position>(bird).unwrap().x = 5.0;
//! store.remove::<Position>(bird).unwrap();
//! store.resolve();
//! assert!(!store.has::<Position>(bird));
//! ```

extern crate self as entity_store;


mod access;
mod component;
mod config;
mod entity;
mod error;
mod event;
mod group;
mod mask;
mod registry;
mod segment;
mod store;
mod view;

#[doc(hidden)]
pub mod private;

pub use access::{Access, AccessSet, Operation};
pub use component::{Component, ComponentMeta, FieldInfo};
pub use config::StoreConfig;
pub use entity::Entity;
pub use error::{ComponentError, RegistryError, StoreError};
pub use event::{Event, EventSender};
pub use group::{Group, GroupIter};
pub use macros::Component;
pub use mask::{Mask, MaskIter};
pub use registry::{ComponentIndex, ComponentRegistry, TypeIndex, TypeInfo, TypeRegistry};
pub use segment::column::{Column, TypedColumn};
pub use segment::{Location, Segment, SegmentIndex};
pub use store::{ComponentStore, StoreId};
pub use view::{Plan, Read, View, ViewElement};

pub(crate) type HashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;
