use crate::component::Component;
use downcast_rs::{impl_downcast, Downcast};

/// Type-erased storage of one component type inside a segment.
///
/// Every column of a segment holds exactly one value per entity of the segment, in the same
/// order as the segment's entity list.
pub trait Column: Downcast + Send + Sync {
    /// Returns the number of values in the column.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn reserve(&mut self, additional: usize);

    /// Removes the value at `row`, moving the last value into its place.
    fn swap_remove(&mut self, row: usize);

    /// Moves the value at `row` to the end of `target`, moving the last value into its place.
    /// `target` must be a column of the same component type.
    fn transfer(&mut self, row: usize, target: &mut dyn Column);
}
impl_downcast!(Column);

#[cold]
#[inline(never)]
pub(crate) fn column_type_mismatch(expected: &str) -> ! {
    panic!("column type mismatch: expected a column of {}", expected);
}

/// Returns `column` as a column of `C`, panicking if it stores another type.
pub(crate) fn typed_mut<C: Component>(column: &mut dyn Column) -> &mut TypedColumn<C> {
    match column.downcast_mut::<TypedColumn<C>>() {
        Some(column) => column,
        None => column_type_mismatch(std::any::type_name::<C>()),
    }
}

/// A column of `C` values.
pub struct TypedColumn<C>(Vec<C>);

impl<C> Default for TypedColumn<C> {
    fn default() -> Self {
        TypedColumn(Vec::new())
    }
}

impl<C: Component> TypedColumn<C> {
    pub fn as_slice(&self) -> &[C] {
        &self.0
    }

    pub fn as_mut_slice(&mut self) -> &mut [C] {
        &mut self.0
    }

    pub(crate) fn push(&mut self, value: C) {
        self.0.push(value);
    }
}

impl<C: Component> Column for TypedColumn<C> {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn reserve(&mut self, additional: usize) {
        self.0.reserve(additional);
    }

    fn swap_remove(&mut self, row: usize) {
        self.0.swap_remove(row);
    }

    fn transfer(&mut self, row: usize, target: &mut dyn Column) {
        let target = typed_mut::<C>(target);
        target.push(self.0.swap_remove(row));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_swaps_last_into_hole() {
        let mut source = TypedColumn::<u32>::default();
        for v in [10, 20, 30] {
            source.push(v);
        }
        let mut target: Box<dyn Column> = Box::new(TypedColumn::<u32>::default());

        source.transfer(0, &mut *target);

        assert_eq!(source.as_slice(), &[30, 20]);
        assert_eq!(
            target.downcast_ref::<TypedColumn<u32>>().unwrap().as_slice(),
            &[10]
        );
    }

    #[test]
    #[should_panic(expected = "column type mismatch")]
    fn transfer_into_foreign_column_panics() {
        let mut source = TypedColumn::<u32>::default();
        source.push(1);
        let mut target = TypedColumn::<u64>::default();
        source.transfer(0, &mut target);
    }
}
