//! Typed column access for groups.
//!
//! A [`View`] names the components a group yields for each entity. For every member segment the
//! group computes a plan (the column positions of the view's components) once, and fetches the
//! column slices of a segment once per iteration.

use crate::component::Component;
use crate::mask::Mask;
use crate::registry::{ComponentIndex, ComponentRegistry};
use crate::segment::column::column_type_mismatch;
use crate::segment::Segment;
use smallvec::SmallVec;
use std::marker::PhantomData;

/// Column positions of a view's components inside one segment.
pub type Plan = SmallVec<[usize; 8]>;

/// Shared access to component `T`. Equivalent to `&T` in a view.
pub struct Read<T>(PhantomData<fn() -> T>);

/// A single component of a view.
pub trait ViewElement {
    type Item<'a>;
    type Fetch<'a>: Copy;

    fn component() -> ComponentIndex;

    /// Fetches the column at position `slot` of `segment`.
    fn fetch<'a>(segment: &'a Segment, slot: usize) -> Self::Fetch<'a>;

    fn get<'a>(fetch: Self::Fetch<'a>, row: usize) -> Self::Item<'a>;
}

fn fetch_column<T: Component>(segment: &Segment, slot: usize) -> &[T] {
    match segment.column_at::<T>(slot) {
        Some(column) => column,
        None => column_type_mismatch(std::any::type_name::<T>()),
    }
}

impl<T: Component> ViewElement for Read<T> {
    type Item<'a> = &'a T;
    type Fetch<'a> = &'a [T];

    fn component() -> ComponentIndex {
        ComponentRegistry::index_of::<T>()
    }

    fn fetch<'a>(segment: &'a Segment, slot: usize) -> Self::Fetch<'a> {
        fetch_column(segment, slot)
    }

    fn get<'a>(fetch: Self::Fetch<'a>, row: usize) -> Self::Item<'a> {
        &fetch[row]
    }
}

impl<'r, T: Component> ViewElement for &'r T {
    type Item<'a> = &'a T;
    type Fetch<'a> = &'a [T];

    fn component() -> ComponentIndex {
        ComponentRegistry::index_of::<T>()
    }

    fn fetch<'a>(segment: &'a Segment, slot: usize) -> Self::Fetch<'a> {
        fetch_column(segment, slot)
    }

    fn get<'a>(fetch: Self::Fetch<'a>, row: usize) -> Self::Item<'a> {
        &fetch[row]
    }
}

/// A set of components read together for every entity of a group.
pub trait View {
    type Item<'a>;
    type Fetch<'a>: Copy;

    /// Returns the components a segment must store to be visited.
    fn requirements() -> Mask;

    /// Computes the column positions of the view's components in a segment with `mask`.
    /// Returns `None` if the segment lacks one of them.
    fn plan(mask: &Mask) -> Option<Plan>;

    fn fetch<'a>(segment: &'a Segment, plan: &[usize]) -> Self::Fetch<'a>;

    fn get<'a>(fetch: Self::Fetch<'a>, row: usize) -> Self::Item<'a>;
}

macro_rules! impl_view {
    ($($name:ident),*) => {
        #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments, clippy::unused_unit)]
        impl<$($name: ViewElement),*> View for ($($name,)*) {
            type Item<'a> = ($($name::Item<'a>,)*);
            type Fetch<'a> = ($($name::Fetch<'a>,)*);

            fn requirements() -> Mask {
                let mut mask = Mask::new();
                $(mask.add($name::component().get());)*
                mask
            }

            fn plan(mask: &Mask) -> Option<Plan> {
                let mut plan = Plan::new();
                $(plan.push(mask.rank($name::component().get())?);)*
                Some(plan)
            }

            fn fetch<'a>(segment: &'a Segment, plan: &[usize]) -> Self::Fetch<'a> {
                let mut slot = 0;
                ($({
                    let fetch = $name::fetch(segment, plan[slot]);
                    slot += 1;
                    fetch
                },)*)
            }

            fn get<'a>(fetch: Self::Fetch<'a>, row: usize) -> Self::Item<'a> {
                let ($($name,)*) = fetch;
                ($($name::get($name, row),)*)
            }
        }
    };
}

macro_rules! impl_single_view {
    ($($ty:ty => [$($gen:tt)*]),*) => {$(
        impl<$($gen)*> View for $ty {
            type Item<'a> = &'a T;
            type Fetch<'a> = &'a [T];

            fn requirements() -> Mask {
                Mask::from_indices([<$ty as ViewElement>::component().get()])
            }

            fn plan(mask: &Mask) -> Option<Plan> {
                let slot = mask.rank(<$ty as ViewElement>::component().get())?;
                Some(smallvec::smallvec![slot])
            }

            fn fetch<'a>(segment: &'a Segment, plan: &[usize]) -> Self::Fetch<'a> {
                fetch_column(segment, plan[0])
            }

            fn get<'a>(fetch: Self::Fetch<'a>, row: usize) -> Self::Item<'a> {
                &fetch[row]
            }
        }
    )*};
}

impl_single_view!(Read<T> => [T: Component], &'r T => ['r, T: Component]);

impl_view!();
impl_view!(A);
impl_view!(A, B);
impl_view!(A, B, C);
impl_view!(A, B, C, D);
impl_view!(A, B, C, D, E);
impl_view!(A, B, C, D, E, F);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::segment::column::typed_mut;
    use crate::segment::SegmentIndex;

    #[test]
    fn plan_requires_every_component() {
        let a = ComponentRegistry::index_of::<u8>();
        let b = ComponentRegistry::index_of::<i8>();
        let mask = Mask::from_indices([a.get(), b.get()]);

        let plan = <(&u8, Read<i8>)>::plan(&mask).unwrap();
        assert_eq!(plan.as_slice(), &[mask.rank(a.get()).unwrap(), mask.rank(b.get()).unwrap()]);
        assert!(<(&u8, &u64)>::plan(&mask).is_none());
        assert!(<()>::plan(&mask).unwrap().is_empty());
        assert_eq!(<(&i8, &u8)>::requirements(), mask);
        assert_eq!(<&u8>::plan(&mask), <Read<u8>>::plan(&mask));
    }

    #[test]
    fn fetch_reads_rows() {
        let a = ComponentRegistry::index_of::<i16>();
        let b = ComponentRegistry::index_of::<f64>();
        let mask = Mask::from_indices([a.get(), b.get()]);
        let mut segment = Segment::new(SegmentIndex::new(1), mask.clone(), 2);
        segment.add(&[Entity::new(0, 0), Entity::new(1, 0)], |ty, column| {
            if ty == a {
                typed_mut::<i16>(column).push(1);
                typed_mut::<i16>(column).push(2);
            } else {
                typed_mut::<f64>(column).push(0.5);
                typed_mut::<f64>(column).push(1.5);
            }
        });

        let plan = <(&f64, &i16)>::plan(&mask).unwrap();
        let fetch = <(&f64, &i16)>::fetch(&segment, &plan);
        assert_eq!(<(&f64, &i16)>::get(fetch, 1), (&1.5, &2));
        assert_eq!(<(&f64, &i16)>::get(fetch, 0), (&0.5, &1));
    }
}
