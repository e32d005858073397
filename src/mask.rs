//! Growable bit-set over component indices. A mask is the identity of a segment.

use smallvec::SmallVec;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::OnceLock;

const BUCKET_BITS: usize = u64::BITS as usize;

/// A set of component indices.
///
/// Trailing empty buckets are always trimmed, so two masks are equal iff their bucket
/// arrays are equal. The hash is cached and reset by every mutation.
#[derive(Default, Clone)]
pub struct Mask {
    buckets: SmallVec<[u64; 2]>,
    hash_val: OnceLock<u64>,
}

impl Mask {
    /// Creates an empty mask.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mask containing exactly the given indices.
    pub fn from_indices<I: IntoIterator<Item = usize>>(indices: I) -> Self {
        let mut mask = Mask::new();
        for index in indices {
            mask.add(index);
        }
        mask
    }

    #[inline]
    fn split(index: usize) -> (usize, u64) {
        (index / BUCKET_BITS, 1 << (index % BUCKET_BITS))
    }

    fn trim(&mut self) {
        while self.buckets.last() == Some(&0) {
            self.buckets.pop();
        }
    }

    fn invalidate(&mut self) {
        self.hash_val = OnceLock::new();
    }

    /// Returns `true` if the mask contains `index`.
    #[inline]
    pub fn has(&self, index: usize) -> bool {
        let (bucket, bit) = Self::split(index);
        self.buckets.get(bucket).map_or(false, |b| b & bit != 0)
    }

    /// Returns `true` if every index of `other` is present in `self`.
    pub fn has_all(&self, other: &Mask) -> bool {
        if other.buckets.len() > self.buckets.len() {
            return false;
        }
        self.buckets
            .iter()
            .zip(&other.buckets)
            .all(|(a, b)| a & b == *b)
    }

    /// Returns `true` if `self` and `other` share at least one index.
    pub fn has_any(&self, other: &Mask) -> bool {
        self.buckets
            .iter()
            .zip(&other.buckets)
            .any(|(a, b)| a & b != 0)
    }

    /// Adds an index to the mask. Returns `true` if the mask changed.
    pub fn add(&mut self, index: usize) -> bool {
        let (bucket, bit) = Self::split(index);
        if bucket >= self.buckets.len() {
            self.buckets.resize(bucket + 1, 0);
        }
        let changed = self.buckets[bucket] & bit == 0;
        if changed {
            self.buckets[bucket] |= bit;
            self.invalidate();
        }
        changed
    }

    /// Removes an index from the mask. Returns `true` if the mask changed.
    pub fn remove(&mut self, index: usize) -> bool {
        let (bucket, bit) = Self::split(index);
        let Some(b) = self.buckets.get_mut(bucket) else {
            return false;
        };
        let changed = *b & bit != 0;
        if changed {
            *b &= !bit;
            self.trim();
            self.invalidate();
        }
        changed
    }

    /// Removes every index. Returns `true` if the mask was not empty.
    pub fn clear(&mut self) -> bool {
        let changed = !self.buckets.is_empty();
        if changed {
            self.buckets.clear();
            self.invalidate();
        }
        changed
    }

    /// Adds every index of `other`. Returns `true` if the mask changed.
    pub fn union_with(&mut self, other: &Mask) -> bool {
        if other.buckets.len() > self.buckets.len() {
            self.buckets.resize(other.buckets.len(), 0);
        }
        let mut changed = false;
        for (a, b) in self.buckets.iter_mut().zip(&other.buckets) {
            changed |= *a | b != *a;
            *a |= b;
        }
        if changed {
            self.invalidate();
        }
        changed
    }

    /// Returns a mask containing the indices of both `self` and `other`.
    pub fn union(&self, other: &Mask) -> Mask {
        let mut mask = self.clone();
        mask.union_with(other);
        mask
    }

    /// Returns a mask containing the indices present in both `self` and `other`.
    pub fn intersection(&self, other: &Mask) -> Mask {
        let mut mask = Mask {
            buckets: self
                .buckets
                .iter()
                .zip(&other.buckets)
                .map(|(a, b)| a & b)
                .collect(),
            hash_val: OnceLock::new(),
        };
        mask.trim();
        mask
    }

    /// Returns `true` if the mask contains no indices.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Returns the number of indices in the mask.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Returns the position of `index` among the indices of the mask in ascending order,
    /// or `None` if the mask does not contain it.
    pub fn rank(&self, index: usize) -> Option<usize> {
        if !self.has(index) {
            return None;
        }
        let (bucket, bit) = Self::split(index);
        let below: usize = self.buckets[..bucket]
            .iter()
            .map(|b| b.count_ones() as usize)
            .sum();
        Some(below + (self.buckets[bucket] & (bit - 1)).count_ones() as usize)
    }

    /// Returns an iterator over the indices in ascending order.
    pub fn iter(&self) -> MaskIter<'_> {
        MaskIter {
            buckets: &self.buckets,
            bucket: 0,
            current: self.buckets.first().copied().unwrap_or(0),
        }
    }

    fn hash_value(&self) -> u64 {
        *self.hash_val.get_or_init(|| {
            // Fixed seeds so that equal masks hash equally across hasher instances.
            let state = ahash::RandomState::with_seeds(0x5e6, 0x3a5c, 0x7f1, 0x2b9d);
            let mut hasher = state.build_hasher();
            self.buckets.hash(&mut hasher);
            hasher.finish()
        })
    }
}

impl PartialEq for Mask {
    fn eq(&self, other: &Self) -> bool {
        self.buckets == other.buckets
    }
}

impl Eq for Mask {}

impl Hash for Mask {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash_value().hash(state);
    }
}

impl fmt::Debug for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<usize> for Mask {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        Mask::from_indices(iter)
    }
}

impl<'a> IntoIterator for &'a Mask {
    type Item = usize;
    type IntoIter = MaskIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the indices of a [`Mask`].
#[derive(Clone)]
pub struct MaskIter<'a> {
    buckets: &'a [u64],
    bucket: usize,
    current: u64,
}

impl Iterator for MaskIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.bucket * BUCKET_BITS + bit);
            }
            self.bucket += 1;
            self.current = *self.buckets.get(self.bucket)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HashMap;

    #[test]
    fn add_and_remove_report_changes() {
        let mut mask = Mask::new();
        assert!(mask.add(3));
        assert!(!mask.add(3));
        assert!(mask.add(130));
        assert!(mask.has(3) && mask.has(130));
        assert!(!mask.has(4));
        assert_eq!(mask.len(), 2);

        assert!(mask.remove(130));
        assert!(!mask.remove(130));
        assert!(!mask.remove(1000));
        assert_eq!(mask, Mask::from_indices([3]));
    }

    #[test]
    fn equality_ignores_growth_history() {
        let mut grown = Mask::new();
        grown.add(200);
        grown.add(1);
        grown.remove(200);

        let plain = Mask::from_indices([1]);
        assert_eq!(grown, plain);

        let mut map = HashMap::default();
        map.insert(plain, "one");
        assert_eq!(map.get(&grown), Some(&"one"));
    }

    #[test]
    fn set_predicates() {
        let ab = Mask::from_indices([0, 70]);
        let a = Mask::from_indices([0]);
        let c = Mask::from_indices([5]);

        assert!(ab.has_all(&a));
        assert!(!a.has_all(&ab));
        assert!(ab.has_all(&Mask::new()));
        assert!(ab.has_any(&a));
        assert!(!ab.has_any(&c));
        assert_eq!(ab.intersection(&a), a);
        assert_eq!(a.union(&c), Mask::from_indices([0, 5]));
        assert!(ab.intersection(&c).is_empty());
    }

    #[test]
    fn hash_follows_mutation() {
        let mut mask = Mask::from_indices([1, 2]);
        let before = mask.hash_value();
        mask.add(9);
        assert_ne!(before, mask.hash_value());
        assert_eq!(mask.hash_value(), Mask::from_indices([9, 2, 1]).hash_value());
    }

    #[test]
    fn iteration_and_rank() {
        let mask = Mask::from_indices([66, 4, 0, 130]);
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![0, 4, 66, 130]);
        assert_eq!(mask.rank(0), Some(0));
        assert_eq!(mask.rank(66), Some(2));
        assert_eq!(mask.rank(130), Some(3));
        assert_eq!(mask.rank(5), None);
        assert_eq!(Mask::new().iter().next(), None);
    }

    #[test]
    fn clear_empties() {
        let mut mask = Mask::from_indices([7]);
        assert!(mask.clear());
        assert!(!mask.clear());
        assert_eq!(mask, Mask::new());
    }
}
