//! Expiring pool for recently evicted items.
//!
//! Items demoted out of the active window are parked here, keyed by their
//! stable key, until a later access or prebuild sweep reclaims them. The
//! pool is the only resource shared between the "serve a visible request"
//! path and the "prebuild ahead" path; both run on the same thread, so
//! ordered mutation alone keeps it consistent.

use log::trace;
use rustc_hash::FxHashMap;

use super::factory::{ItemKey, ItemKind};

/// An evicted item awaiting possible reuse.
///
/// `index_hint` remembers where the item last lived so an index-driven
/// prebuild sweep can reclaim it without consulting the factory. `None`
/// means the hint was invalidated (a reload, or the hinted index was
/// deleted); such entries are only reusable by key.
#[derive(Debug)]
pub struct PooledItem<N> {
    pub index_hint: Option<usize>,
    pub kind: ItemKind,
    pub node: N,
}

/// Key-indexed holding area for evicted items.
#[derive(Debug)]
pub struct ExpiringPool<N> {
    items: FxHashMap<ItemKey, PooledItem<N>>,
}

impl<N> Default for ExpiringPool<N> {
    fn default() -> Self {
        Self {
            items: FxHashMap::default(),
        }
    }
}

impl<N> ExpiringPool<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains_key(&self, key: ItemKey) -> bool {
        self.items.contains_key(&key)
    }

    /// Parks an item under its key. Returns the displaced entry if the key
    /// was already present (the caller decides how to tear it down).
    pub fn insert(&mut self, key: ItemKey, item: PooledItem<N>) -> Option<PooledItem<N>> {
        self.items.insert(key, item)
    }

    /// Reclaims an item by key.
    pub fn take(&mut self, key: ItemKey) -> Option<PooledItem<N>> {
        self.items.remove(&key)
    }

    /// Reclaims an item whose hint matches `index`, if any.
    pub fn take_by_hint(&mut self, index: usize) -> Option<(ItemKey, PooledItem<N>)> {
        let key = self
            .items
            .iter()
            .find(|(_, item)| item.index_hint == Some(index))
            .map(|(key, _)| *key)?;
        self.items.remove(&key).map(|item| (key, item))
    }

    /// Shifts hints at or above `index` up by one after an insertion.
    pub fn shift_hints_for_insert(&mut self, index: usize) {
        for item in self.items.values_mut() {
            if let Some(hint) = item.index_hint {
                if hint >= index {
                    item.index_hint = Some(hint + 1);
                }
            }
        }
    }

    /// Shifts hints above `index` down by one after a deletion; a hint that
    /// pointed exactly at the deleted index is invalidated but the item is
    /// kept for key-based reuse.
    pub fn shift_hints_for_delete(&mut self, index: usize) {
        for item in self.items.values_mut() {
            match item.index_hint {
                Some(hint) if hint > index => item.index_hint = Some(hint - 1),
                Some(hint) if hint == index => item.index_hint = None,
                _ => {}
            }
        }
    }

    /// Drops entries still carrying a concrete hint. Run after a completed
    /// prebuild sweep: a hinted entry the sweep did not reclaim can never be
    /// reclaimed by index, while hintless entries stay reusable by key.
    pub fn evict_hinted(&mut self) {
        let before = self.items.len();
        self.items.retain(|_, item| item.index_hint.is_none());
        let evicted = before - self.items.len();
        if evicted > 0 {
            trace!("expiring pool evicted {evicted} stale entries");
        }
    }

    /// Drops everything, destroying the parked items.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemKey, &PooledItem<N>)> + '_ {
        self.items.iter().map(|(key, item)| (*key, item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pooled(hint: Option<usize>, node: u32) -> PooledItem<u32> {
        PooledItem {
            index_hint: hint,
            kind: ItemKind::Leaf,
            node,
        }
    }

    #[test]
    fn test_take_by_key_and_hint() {
        let mut pool = ExpiringPool::new();
        pool.insert(ItemKey(1), pooled(Some(4), 40));
        pool.insert(ItemKey(2), pooled(None, 50));

        let (key, item) = pool.take_by_hint(4).unwrap();
        assert_eq!(key, ItemKey(1));
        assert_eq!(item.node, 40);
        assert!(pool.take_by_hint(4).is_none());

        assert_eq!(pool.take(ItemKey(2)).unwrap().node, 50);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_shift_hints_for_insert() {
        let mut pool = ExpiringPool::new();
        pool.insert(ItemKey(1), pooled(Some(2), 0));
        pool.insert(ItemKey(2), pooled(Some(5), 0));
        pool.insert(ItemKey(3), pooled(None, 0));

        pool.shift_hints_for_insert(3);

        assert!(pool.take_by_hint(2).is_some());
        assert!(pool.take_by_hint(6).is_some());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_shift_hints_for_delete_invalidates_exact_match() {
        let mut pool = ExpiringPool::new();
        pool.insert(ItemKey(1), pooled(Some(3), 0));
        pool.insert(ItemKey(2), pooled(Some(7), 0));

        pool.shift_hints_for_delete(3);

        // Deleted index: hint gone, item still reusable by key.
        assert!(pool.take_by_hint(3).is_none());
        assert!(pool.contains_key(ItemKey(1)));
        assert!(pool.take_by_hint(6).is_some());
    }

    #[test]
    fn test_evict_hinted_keeps_keyed_entries() {
        let mut pool = ExpiringPool::new();
        pool.insert(ItemKey(1), pooled(Some(9), 0));
        pool.insert(ItemKey(2), pooled(None, 0));

        pool.evict_hinted();

        assert_eq!(pool.len(), 1);
        assert!(pool.contains_key(ItemKey(2)));
    }

    #[test]
    fn test_insert_returns_displaced_entry() {
        let mut pool = ExpiringPool::new();
        assert!(pool.insert(ItemKey(1), pooled(None, 1)).is_none());
        let displaced = pool.insert(ItemKey(1), pooled(None, 2)).unwrap();
        assert_eq!(displaced.node, 1);
        assert_eq!(pool.take(ItemKey(1)).unwrap().node, 2);
    }
}
