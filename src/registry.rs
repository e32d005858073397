//! Process-wide type identities.
//!
//! Every type seen by the engine gets a [`TypeIndex`] the first time it is registered. Component
//! types additionally get a densely packed [`ComponentIndex`], which is the bit the type occupies
//! in a [`Mask`]. Both are stable for the lifetime of the process and never reused.
//!
//! Registration is serialized through a write lock; concurrent callers registering the same
//! type observe the same index.

use crate::component::{Component, ComponentMeta};
use crate::error::RegistryError;
use crate::mask::Mask;
use crate::HashMap;
use parking_lot::RwLock;
use std::any::TypeId;
use std::fmt;
use std::sync::{Arc, OnceLock};

#[cold]
#[inline(never)]
fn out_of_indices(what: &str) -> ! {
    panic!("Out of {} indices. A maximum of {} is reached.", what, u32::MAX);
}

/// A process-wide index of a registered type.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TypeIndex(u32);

impl TypeIndex {
    fn new(index: usize) -> Self {
        match u32::try_from(index) {
            Ok(index) => TypeIndex(index),
            Err(_) => out_of_indices("type"),
        }
    }

    pub fn get(&self) -> usize {
        self.0 as usize
    }
}

/// A dense index of a component type. This is the bit of the type in a [`Mask`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ComponentIndex(u32);

impl ComponentIndex {
    pub(crate) fn new(index: usize) -> Self {
        match u32::try_from(index) {
            Ok(index) => ComponentIndex(index),
            Err(_) => out_of_indices("component"),
        }
    }

    pub fn get(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ComponentIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Describes a registered type.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TypeInfo {
    pub type_id: TypeId,
    pub name: &'static str,
}

impl TypeInfo {
    pub fn of<T: 'static>() -> Self {
        TypeInfo {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

#[derive(Default)]
struct TypeTable {
    by_id: HashMap<TypeId, TypeIndex>,
    infos: Vec<TypeInfo>,
}

fn types() -> &'static RwLock<TypeTable> {
    static TYPES: OnceLock<RwLock<TypeTable>> = OnceLock::new();
    TYPES.get_or_init(Default::default)
}

/// The process-wide registry of all types.
pub struct TypeRegistry;

impl TypeRegistry {
    /// Returns the index of `T`, registering it if necessary.
    pub fn index_of<T: 'static>() -> TypeIndex {
        Self::register(TypeInfo::of::<T>())
    }

    /// Returns the index of the described type, registering it if necessary.
    pub fn register(info: TypeInfo) -> TypeIndex {
        if let Some(index) = types().read().by_id.get(&info.type_id) {
            return *index;
        }

        let mut table = types().write();
        let TypeTable { by_id, infos } = &mut *table;
        *by_id.entry(info.type_id).or_insert_with(|| {
            let index = TypeIndex::new(infos.len());
            infos.push(info);
            index
        })
    }

    /// Returns the index of a type if it was registered.
    pub fn lookup(type_id: TypeId) -> Option<TypeIndex> {
        types().read().by_id.get(&type_id).copied()
    }

    /// Maps an index back to its type.
    pub fn info(index: TypeIndex) -> Option<TypeInfo> {
        types().read().infos.get(index.get()).copied()
    }

    /// Returns the number of registered types.
    pub fn len() -> usize {
        types().read().infos.len()
    }
}

#[derive(Default)]
struct ComponentTable {
    by_id: HashMap<TypeId, ComponentIndex>,
    metas: Vec<Arc<ComponentMeta>>,
    masks: Vec<Mask>,
}

fn components() -> &'static RwLock<ComponentTable> {
    static COMPONENTS: OnceLock<RwLock<ComponentTable>> = OnceLock::new();
    COMPONENTS.get_or_init(Default::default)
}

/// The process-wide registry of component types.
pub struct ComponentRegistry;

impl ComponentRegistry {
    /// Registers `C` and returns its metadata. Registering twice is a no-op.
    pub fn register<C: Component>() -> Arc<ComponentMeta> {
        let type_id = TypeId::of::<C>();
        {
            let table = components().read();
            if let Some(index) = table.by_id.get(&type_id) {
                return Arc::clone(&table.metas[index.get()]);
            }
        }

        let type_index = TypeRegistry::index_of::<C>();

        let mut table = components().write();
        let ComponentTable { by_id, metas, masks } = &mut *table;
        let index = *by_id.entry(type_id).or_insert_with(|| {
            let index = ComponentIndex::new(metas.len());
            metas.push(Arc::new(ComponentMeta::of::<C>(index, type_index)));
            masks.push(Mask::from_indices([index.get()]));
            tracing::trace!(component = metas[index.get()].name(), %index, "registered component");
            index
        });
        Arc::clone(&metas[index.get()])
    }

    /// Returns the component index of `C`, registering it if necessary.
    pub fn index_of<C: Component>() -> ComponentIndex {
        let type_id = TypeId::of::<C>();
        if let Some(index) = components().read().by_id.get(&type_id) {
            return *index;
        }
        Self::register::<C>().index()
    }

    /// Returns the component index of `C` if it was registered.
    pub fn lookup<C: Component>() -> Option<ComponentIndex> {
        components().read().by_id.get(&TypeId::of::<C>()).copied()
    }

    /// Returns the component index of a type given its `TypeId`.
    ///
    /// Fails if the type was never registered, or if it is registered but not as a component.
    pub fn index_of_id(type_id: TypeId) -> Result<ComponentIndex, RegistryError> {
        if let Some(index) = components().read().by_id.get(&type_id) {
            return Ok(*index);
        }
        match TypeRegistry::lookup(type_id).and_then(TypeRegistry::info) {
            Some(info) => Err(RegistryError::NotAComponent {
                type_name: info.name,
            }),
            None => Err(RegistryError::Unregistered(type_id)),
        }
    }

    /// Returns the mask containing exactly the bit of `C`.
    pub fn mask_of<C: Component>() -> Mask {
        let index = Self::index_of::<C>();
        components().read().masks[index.get()].clone()
    }

    /// Returns the mask containing exactly the bit of the component at `index`.
    pub fn mask_of_index(index: ComponentIndex) -> Option<Mask> {
        components().read().masks.get(index.get()).cloned()
    }

    /// Returns the metadata of the component at `index`.
    pub fn metadata(index: ComponentIndex) -> Option<Arc<ComponentMeta>> {
        components().read().metas.get(index.get()).cloned()
    }

    /// Returns the metadata of a component type given its `TypeId`.
    pub fn try_get_metadata(type_id: TypeId) -> Option<Arc<ComponentMeta>> {
        let table = components().read();
        let index = table.by_id.get(&type_id)?;
        Some(Arc::clone(&table.metas[index.get()]))
    }

    /// Maps a component index back to its type.
    pub fn type_info(index: ComponentIndex) -> Option<TypeInfo> {
        Self::metadata(index).map(|meta| TypeInfo {
            type_id: meta.type_id(),
            name: meta.name(),
        })
    }

    /// Returns the number of registered component types.
    pub fn len() -> usize {
        components().read().metas.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Component;
    use std::thread;

    #[derive(Component)]
    struct Alpha {
        _value: u32,
    }

    #[derive(Component)]
    struct Beta;

    struct NotAComponent;

    #[test]
    fn indices_are_stable() {
        let a = ComponentRegistry::index_of::<Alpha>();
        let b = ComponentRegistry::index_of::<Beta>();
        assert_ne!(a, b);
        assert_eq!(a, ComponentRegistry::index_of::<Alpha>());
        assert_eq!(ComponentRegistry::lookup::<Beta>(), Some(b));

        let meta = ComponentRegistry::metadata(a).unwrap();
        assert_eq!(meta.type_id(), TypeId::of::<Alpha>());
        assert_eq!(meta.type_index(), TypeRegistry::index_of::<Alpha>());
        assert_eq!(
            ComponentRegistry::type_info(b).map(|info| info.type_id),
            Some(TypeId::of::<Beta>())
        );
    }

    #[test]
    fn masks_are_distinct_single_bits() {
        let a = ComponentRegistry::mask_of::<Alpha>();
        let b = ComponentRegistry::mask_of::<Beta>();
        assert_ne!(a, b);
        assert_eq!(a.len(), 1);
        assert!(a.has(ComponentRegistry::index_of::<Alpha>().get()));

        let mut ab = a.clone();
        ab.add(ComponentRegistry::index_of::<Beta>().get());
        assert!(ab.has(ComponentRegistry::index_of::<Alpha>().get()));
        assert_eq!(ComponentRegistry::mask_of::<Alpha>(), a);
    }

    #[test]
    fn index_masks_and_counts() {
        let a = ComponentRegistry::index_of::<Alpha>();
        assert_eq!(ComponentRegistry::mask_of_index(a), Some(ComponentRegistry::mask_of::<Alpha>()));
        assert_eq!(ComponentRegistry::mask_of_index(ComponentIndex::new(u32::MAX as usize)), None);

        struct Counted;
        let before = TypeRegistry::len();
        let index = TypeRegistry::index_of::<Counted>();
        assert!(TypeRegistry::len() > index.get());
        assert!(TypeRegistry::len() >= before);
        assert_eq!(TypeRegistry::index_of::<Counted>(), index);
        assert_eq!(TypeRegistry::info(index), Some(TypeInfo::of::<Counted>()));
        assert!(ComponentRegistry::len() > a.get());
    }

    #[test]
    fn non_components_are_rejected() {
        assert_eq!(
            ComponentRegistry::index_of_id(TypeId::of::<[u8; 3]>()),
            Err(RegistryError::Unregistered(TypeId::of::<[u8; 3]>()))
        );

        TypeRegistry::index_of::<NotAComponent>();
        assert!(matches!(
            ComponentRegistry::index_of_id(TypeId::of::<NotAComponent>()),
            Err(RegistryError::NotAComponent { .. })
        ));
        assert!(ComponentRegistry::try_get_metadata(TypeId::of::<NotAComponent>()).is_none());
    }

    #[test]
    fn concurrent_registration_has_single_winner() {
        #[derive(Component)]
        struct Contended;

        let indices: Vec<_> = (0..8)
            .map(|_| thread::spawn(ComponentRegistry::index_of::<Contended>))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        assert!(indices.windows(2).all(|w| w[0] == w[1]));
    }
}
