pub mod column;

use crate::component::Component;
use crate::entity::Entity;
use crate::mask::Mask;
use crate::registry::{ComponentIndex, ComponentRegistry};
use column::{Column, TypedColumn};
use smallvec::SmallVec;
use std::fmt;

/// The index of a segment in a store.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SegmentIndex(u32);

impl SegmentIndex {
    /// The segment of entities without components. It exists in every store.
    pub const EMPTY: Self = SegmentIndex(0);

    pub(crate) fn new(index: usize) -> Self {
        match u32::try_from(index) {
            Ok(index) => SegmentIndex(index),
            Err(_) => panic!("Out of segment indices. A maximum of {} is reached.", u32::MAX),
        }
    }

    pub fn get(&self) -> usize {
        self.0 as usize
    }
}

/// The current row of an entity.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Location {
    pub segment: SegmentIndex,
    pub index: usize,
}

/// A collection of entities with an identical set of components.
///
/// Components are stored column-wise: one [`Column`] per component type of the mask, ordered
/// by ascending component index. Row `k` of every column belongs to `entities()[k]`.
pub struct Segment {
    index: SegmentIndex,
    mask: Mask,
    types: SmallVec<[ComponentIndex; 8]>,
    columns: Vec<Box<dyn Column>>,
    entities: Vec<Entity>,
}

impl Segment {
    pub(crate) fn new(index: SegmentIndex, mask: Mask, capacity: usize) -> Self {
        let types: SmallVec<[ComponentIndex; 8]> =
            mask.iter().map(ComponentIndex::new).collect();
        let columns = types
            .iter()
            .map(|ty| {
                let Some(meta) = ComponentRegistry::metadata(*ty) else {
                    panic!("segment mask contains unregistered component {}", ty);
                };
                let mut column = meta.new_column();
                column.reserve(capacity);
                column
            })
            .collect();

        Segment {
            index,
            mask,
            types,
            columns,
            entities: Vec::with_capacity(capacity),
        }
    }

    pub fn index(&self) -> SegmentIndex {
        self.index
    }

    /// Returns the set of component types of this segment.
    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    /// Returns the component types of this segment in column order.
    pub fn component_types(&self) -> &[ComponentIndex] {
        &self.types
    }

    /// Returns the entities of this segment in row order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Returns the number of entities in the segment.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns `true` if the segment stores the component at `index`.
    pub fn has(&self, index: ComponentIndex) -> bool {
        self.mask.has(index.get())
    }

    /// Returns `true` if the segment stores components of type `C`.
    pub fn has_component<C: Component>(&self) -> bool {
        ComponentRegistry::lookup::<C>().map_or(false, |index| self.has(index))
    }

    /// Returns the column position of the component at `index`.
    pub fn column_slot(&self, index: ComponentIndex) -> Option<usize> {
        self.mask.rank(index.get())
    }

    /// Returns the backing column of the component at `index`.
    pub fn store(&self, index: ComponentIndex) -> Option<&dyn Column> {
        let slot = self.column_slot(index)?;
        Some(&*self.columns[slot])
    }

    pub(crate) fn store_mut(&mut self, index: ComponentIndex) -> Option<&mut dyn Column> {
        let slot = self.column_slot(index)?;
        Some(&mut *self.columns[slot])
    }

    /// Returns the values of the column at position `slot` if it stores `C`.
    pub fn column_at<C: Component>(&self, slot: usize) -> Option<&[C]> {
        let column = self.columns.get(slot)?;
        Some(column.downcast_ref::<TypedColumn<C>>()?.as_slice())
    }

    /// Returns the values of component `C` in row order.
    pub fn column<C: Component>(&self) -> Option<&[C]> {
        self.column_by_index(ComponentRegistry::lookup::<C>()?)
    }

    /// Returns the mutable values of component `C` in row order.
    pub fn column_mut<C: Component>(&mut self) -> Option<&mut [C]> {
        self.column_by_index_mut(ComponentRegistry::lookup::<C>()?)
    }

    pub(crate) fn column_by_index<C: Component>(&self, index: ComponentIndex) -> Option<&[C]> {
        self.column_at(self.column_slot(index)?)
    }

    pub(crate) fn column_by_index_mut<C: Component>(
        &mut self,
        index: ComponentIndex,
    ) -> Option<&mut [C]> {
        let slot = self.column_slot(index)?;
        let column = self.columns[slot].downcast_mut::<TypedColumn<C>>()?;
        Some(column.as_mut_slice())
    }

    /// Appends `entities` and returns the row of the first one.
    ///
    /// `fill` is called once per column with the component type of the column and must push
    /// exactly `entities.len()` values into it. Entities are appended only after every column
    /// is filled, so the entity count never exceeds the length of any column.
    pub(crate) fn add<F>(&mut self, entities: &[Entity], mut fill: F) -> usize
    where
        F: FnMut(ComponentIndex, &mut dyn Column),
    {
        let start = self.entities.len();
        let end = start + entities.len();

        for (ty, column) in self.types.iter().zip(&mut self.columns) {
            column.reserve(entities.len());
            fill(*ty, &mut **column);
            assert_eq!(
                column.len(),
                end,
                "column of component {} was not filled for every added entity",
                ty
            );
        }
        self.entities.extend_from_slice(entities);

        start
    }

    /// Pops the value at `row` of the column at `index` into `target`.
    /// Returns `false` if the segment does not store the component.
    pub(crate) fn transfer(
        &mut self,
        index: ComponentIndex,
        row: usize,
        target: &mut dyn Column,
    ) -> bool {
        match self.store_mut(index) {
            Some(column) => {
                column.transfer(row, target);
                true
            }
            None => false,
        }
    }

    /// Swap-removes `row` from the entity list and from every column whose type is not in
    /// `transferred` (those were already moved out with [`transfer`](Self::transfer)).
    ///
    /// Returns the entity which now occupies `row`, if any.
    pub(crate) fn remove_row(&mut self, row: usize, transferred: &Mask) -> Option<Entity> {
        for (ty, column) in self.types.iter().zip(&mut self.columns) {
            if !transferred.has(ty.get()) {
                column.swap_remove(row);
            }
        }
        self.entities.swap_remove(row);
        self.entities.get(row).copied()
    }

    /// Swap-removes `row`. Returns the entity which now occupies `row`, if any.
    pub(crate) fn remove(&mut self, row: usize) -> Option<Entity> {
        self.remove_row(row, &Mask::new())
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("index", &self.index)
            .field("mask", &self.mask)
            .field("len", &self.entities.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::column::typed_mut;

    fn segment_of(types: &[ComponentIndex]) -> Segment {
        Segment::new(
            SegmentIndex::new(1),
            types.iter().map(|ty| ty.get()).collect(),
            4,
        )
    }

    #[test]
    fn columns_follow_mask_order() {
        let a = ComponentRegistry::index_of::<u8>();
        let b = ComponentRegistry::index_of::<u16>();
        let segment = segment_of(&[b, a]);

        let (first, second) = if a < b { (a, b) } else { (b, a) };
        assert_eq!(segment.component_types(), &[first, second]);
        assert_eq!(segment.column_slot(first), Some(0));
        assert_eq!(segment.column_slot(second), Some(1));
        assert!(segment.has_component::<u8>());
        assert!(!segment.has_component::<String>());
        assert!(segment.column::<u8>().unwrap().is_empty());
    }

    #[test]
    fn remove_moves_last_row_into_hole() {
        let ty = ComponentRegistry::index_of::<u32>();
        let mut segment = segment_of(&[ty]);
        let entities = [Entity::new(0, 0), Entity::new(1, 0), Entity::new(2, 0)];

        let start = segment.add(&entities, |_, column| {
            let column = typed_mut::<u32>(column);
            for v in [100, 101, 102] {
                column.push(v);
            }
        });
        assert_eq!(start, 0);
        assert_eq!(segment.len(), 3);

        assert_eq!(segment.remove(0), Some(Entity::new(2, 0)));
        assert_eq!(segment.entities(), &[Entity::new(2, 0), Entity::new(1, 0)]);
        assert_eq!(segment.column::<u32>().unwrap(), &[102, 101]);

        assert_eq!(segment.remove(1), None);
        assert_eq!(segment.entities(), &[Entity::new(2, 0)]);
        assert_eq!(segment.column::<u32>().unwrap(), &[102]);
    }

    #[test]
    fn store_exposes_backing_columns() {
        let values = ComponentRegistry::index_of::<u32>();
        let flags = ComponentRegistry::index_of::<bool>();
        let mut segment = segment_of(&[values]);
        segment.add(&[Entity::new(0, 0), Entity::new(1, 0)], |_, column| {
            let column = typed_mut::<u32>(column);
            column.push(7);
            column.push(8);
        });

        let column = segment.store(values).unwrap();
        assert_eq!(column.len(), 2);
        assert_eq!(
            column.downcast_ref::<TypedColumn<u32>>().unwrap().as_slice(),
            &[7, 8]
        );
        assert!(segment.store(flags).is_none());

        segment.column_mut::<u32>().unwrap()[1] = 80;
        assert_eq!(segment.column::<u32>().unwrap(), &[7, 80]);
        assert!(segment.column_mut::<bool>().is_none());
    }

    #[test]
    #[should_panic(expected = "was not filled")]
    fn unfilled_column_is_rejected() {
        let ty = ComponentRegistry::index_of::<i64>();
        let mut segment = segment_of(&[ty]);
        segment.add(&[Entity::new(0, 0)], |_, _| {});
    }
}
