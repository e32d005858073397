use crate::registry::{ComponentIndex, TypeIndex};
use crate::segment::column::{Column, TypedColumn};
use smallvec::SmallVec;
use std::any::TypeId;
use std::fmt;

pub const MAX_FIELDS_ON_STACK: usize = 8;

/// A type which can be attached to an entity.
///
/// Implemented with `#[derive(Component)]`, which also reports the data fields of the type.
/// Types may implement it by hand as well; `fields` then defaults to an empty list.
pub trait Component: Send + Sync + 'static {
    /// Describes the data fields of the component.
    fn fields() -> SmallVec<[FieldInfo; MAX_FIELDS_ON_STACK]> {
        SmallVec::new()
    }
}

/// A data field of a component type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: &'static str,
    pub type_name: &'static str,
    /// Byte offset of the field inside the component.
    pub offset: usize,
    pub size: usize,
}

/// Registry record of a component type.
pub struct ComponentMeta {
    pub(crate) index: ComponentIndex,
    pub(crate) type_index: TypeIndex,
    pub(crate) type_id: TypeId,
    pub(crate) name: &'static str,
    pub(crate) size: usize,
    pub(crate) align: usize,
    pub(crate) needs_drop: bool,
    pub(crate) fields: SmallVec<[FieldInfo; MAX_FIELDS_ON_STACK]>,
    pub(crate) new_column: fn() -> Box<dyn Column>,
}

impl ComponentMeta {
    pub(crate) fn of<C: Component>(index: ComponentIndex, type_index: TypeIndex) -> Self {
        ComponentMeta {
            index,
            type_index,
            type_id: TypeId::of::<C>(),
            name: std::any::type_name::<C>(),
            size: std::mem::size_of::<C>(),
            align: std::mem::align_of::<C>(),
            needs_drop: std::mem::needs_drop::<C>(),
            fields: C::fields(),
            new_column: || Box::new(TypedColumn::<C>::default()),
        }
    }

    /// Returns the dense component index, i.e. the bit of the type in a [`Mask`](crate::Mask).
    pub fn index(&self) -> ComponentIndex {
        self.index
    }

    /// Returns the process-wide type index.
    pub fn type_index(&self) -> TypeIndex {
        self.type_index
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    pub fn needs_drop(&self) -> bool {
        self.needs_drop
    }

    /// Returns the data fields of the component type.
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Creates an empty typed column for this component type.
    pub fn new_column(&self) -> Box<dyn Column> {
        (self.new_column)()
    }
}

impl fmt::Debug for ComponentMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentMeta")
            .field("index", &self.index)
            .field("type_index", &self.type_index)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("fields", &self.fields)
            .finish()
    }
}

impl Component for bool {}
impl Component for u8 {}
impl Component for u16 {}
impl Component for u32 {}
impl Component for u64 {}
impl Component for usize {}
impl Component for i8 {}
impl Component for i16 {}
impl Component for i32 {}
impl Component for i64 {}
impl Component for isize {}
impl Component for f32 {}
impl Component for f64 {}
impl Component for String {}
