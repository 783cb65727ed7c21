//! Fixed-capacity slot allocator
//!
//! A zone of same-typed kernel objects addressed by slot index. Indices
//! stay stable for an object's lifetime, which is what lets every list in
//! the scheduler link by index instead of by pointer. Freed slots are
//! reused lowest-first.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

/// Zone of `T` with at most `capacity` live entries
#[derive(Debug)]
pub struct Slab<T> {
    entries: Vec<Option<T>>,
    free: BTreeSet<u32>,
    capacity: u32,
    live: u32,
}

impl<T> Slab<T> {
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            entries: Vec::new(),
            free: BTreeSet::new(),
            capacity,
            live: 0,
        }
    }

    /// Index the next `insert` will use, if there is room
    pub fn vacant_index(&self) -> Option<u32> {
        if let Some(idx) = self.free.first() {
            return Some(*idx);
        }
        if (self.entries.len() as u32) < self.capacity {
            Some(self.entries.len() as u32)
        } else {
            None
        }
    }

    /// Store `value`; `None` when the zone is exhausted
    pub fn insert(&mut self, value: T) -> Option<u32> {
        let idx = self.vacant_index()?;
        if (idx as usize) < self.entries.len() {
            self.free.remove(&idx);
            self.entries[idx as usize] = Some(value);
        } else {
            self.entries.push(Some(value));
        }
        self.live += 1;
        Some(idx)
    }

    /// Free a slot, returning what it held
    pub fn remove(&mut self, idx: u32) -> Option<T> {
        let value = self.entries.get_mut(idx as usize)?.take()?;
        self.free.insert(idx);
        self.live -= 1;
        Some(value)
    }

    #[inline]
    pub fn get(&self, idx: u32) -> Option<&T> {
        self.entries.get(idx as usize)?.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, idx: u32) -> Option<&mut T> {
        self.entries.get_mut(idx as usize)?.as_mut()
    }

    pub fn contains(&self, idx: u32) -> bool {
        self.get(idx).is_some()
    }

    pub fn len(&self) -> usize {
        self.live as usize
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Live entries in index order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|v| (i as u32, v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_until_exhausted() {
        let mut slab = Slab::with_capacity(2);
        assert_eq!(slab.insert('a'), Some(0));
        assert_eq!(slab.insert('b'), Some(1));
        assert_eq!(slab.insert('c'), None);
        assert_eq!(slab.len(), 2);
        assert_eq!(slab.get(1), Some(&'b'));
    }

    #[test]
    fn test_reuse_lowest_free_slot() {
        let mut slab = Slab::with_capacity(4);
        for v in 0..4 {
            slab.insert(v);
        }
        assert_eq!(slab.remove(2), Some(2));
        assert_eq!(slab.remove(1), Some(1));
        assert_eq!(slab.remove(1), None);
        assert_eq!(slab.vacant_index(), Some(1));
        assert_eq!(slab.insert(10), Some(1));
        assert_eq!(slab.insert(20), Some(2));
        assert!(slab.contains(2));
        let live: Vec<u32> = slab.iter().map(|(i, _)| i).collect();
        assert_eq!(live, vec![0, 1, 2, 3]);
    }
}
