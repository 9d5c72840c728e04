//! The virtualization item cache.
//!
//! [`ItemCache`] owns the active-window cache table and the expiring pool,
//! and implements lookup-or-build, mutation diffing, and the
//! deadline-bounded prebuild sweep. All failure paths degrade to empty
//! results; nothing here panics across the library boundary.

use std::collections::BTreeMap;

use log::{debug, trace, warn};
use smallvec::SmallVec;
use web_time::Instant;

use super::expiring::{ExpiringPool, PooledItem};
use super::factory::{BuildResult, ItemConstraint, ItemFactory, ItemKey, ItemKind};
use super::window::ActiveWindow;
use super::VirtualizeSpec;

/// A materialized (or promised) slot in the cache table.
///
/// While `node` is `Some`, the cache exclusively owns the item. `None` is a
/// promised-but-evicted slot: the key is known but the item must be
/// reclaimed or rebuilt before it can be served.
#[derive(Debug)]
pub struct CachedItem<N> {
    pub key: ItemKey,
    pub kind: ItemKind,
    pub node: Option<N>,
}

/// Lazy virtualization cache over an [`ItemFactory`].
///
/// Indices are volatile: every mutation notification re-keys the table so
/// cached items follow their logical position. Keys are stable and drive
/// recycling through the expiring pool.
pub struct ItemCache<F: ItemFactory> {
    factory: F,
    spec: VirtualizeSpec,
    cached: BTreeMap<usize, CachedItem<F::Item>>,
    pool: ExpiringPool<F::Item>,
    window: ActiveWindow,
    transition_pending: bool,
}

impl<F: ItemFactory> ItemCache<F> {
    /// Creates a cache over `factory`. Factories opting into
    /// [`ItemFactory::expand_all_on_initial`] are expanded eagerly.
    pub fn new(factory: F, spec: VirtualizeSpec) -> Self {
        let mut cache = Self {
            factory,
            spec,
            cached: BTreeMap::new(),
            pool: ExpiringPool::new(),
            window: ActiveWindow::empty(),
            transition_pending: false,
        };
        cache.expand_all();
        cache
    }

    pub fn spec(&self) -> VirtualizeSpec {
        self.spec
    }

    /// Reconfigures the prebuild radius and loop mode.
    pub fn set_spec(&mut self, spec: VirtualizeSpec) {
        self.spec = spec;
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut F {
        &mut self.factory
    }

    /// Swaps the backing factory. All cached and expiring items are purged;
    /// stale entries are never merged across a factory swap.
    pub fn set_factory(&mut self, factory: F) {
        self.factory = factory;
        self.cached.clear();
        self.pool.clear();
        self.window.clear();
        self.transition_pending = false;
        self.expand_all();
    }

    /// Total item count of the backing collection.
    pub fn total_count(&self) -> usize {
        self.factory.total_count()
    }

    pub fn window(&self) -> ActiveWindow {
        self.window
    }

    /// Number of entries holding a live item handle.
    pub fn built_count(&self) -> usize {
        self.cached.values().filter(|e| e.node.is_some()).count()
    }

    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    /// Consumes the one-shot "needs exit transition" flag set by a reload.
    pub fn take_transition_pending(&mut self) -> bool {
        std::mem::take(&mut self.transition_pending)
    }

    /// Iterates entries holding a live handle, in index order.
    pub fn built_items(&self) -> impl Iterator<Item = (usize, ItemKey, &F::Item)> + '_ {
        self.cached
            .iter()
            .filter_map(|(&index, entry)| entry.node.as_ref().map(|node| (index, entry.key, node)))
    }

    /// Applies an invalidation callback to every currently built entry.
    /// Promised slots without a handle are skipped.
    pub fn set_flag_for_generated_items<G>(&self, mut apply: G)
    where
        G: FnMut(&F::Item),
    {
        for entry in self.cached.values() {
            if let Some(node) = &entry.node {
                apply(node);
            }
        }
    }

    /// Serves the item at `index`, building it if allowed.
    ///
    /// Resolution order: a cached handle wins; a promised slot is reclaimed
    /// from the pool by key; otherwise the factory builds (which may itself
    /// recycle from the pool). With `need_build == false` the call has no
    /// side effect beyond the reclaim.
    pub fn get_child_by_index(
        &mut self,
        index: usize,
        need_build: bool,
    ) -> Option<(ItemKey, Option<&F::Item>)> {
        enum Plan {
            Serve,
            Reclaim(ItemKey),
            Miss,
        }
        let plan = match self.cached.get(&index) {
            Some(entry) if entry.node.is_some() => Plan::Serve,
            Some(entry) => Plan::Reclaim(entry.key),
            None => Plan::Miss,
        };
        match plan {
            Plan::Serve => {}
            Plan::Reclaim(key) => {
                if let Some(pooled) = self.pool.take(key) {
                    trace!("reclaimed {key:?} into promised slot at index {index}");
                    let entry = self.cached.get_mut(&index)?;
                    entry.kind = pooled.kind;
                    entry.node = Some(pooled.node);
                    self.window.extend_to(index);
                } else if !need_build {
                    return Some((key, None));
                } else if self.build_into(index, None) {
                    self.window.extend_to(index);
                }
            }
            Plan::Miss => {
                if !need_build {
                    return None;
                }
                if self.build_into(index, None) {
                    self.window.extend_to(index);
                }
            }
        }
        let entry = self.cached.get(&index)?;
        Some((entry.key, entry.node.as_ref()))
    }

    /// Builds `index` through the factory and installs the result.
    /// Returns whether an entry (built or promised) now exists there.
    fn build_into(&mut self, index: usize, constraint: Option<&ItemConstraint>) -> bool {
        match self.factory.build_item(index, &mut self.pool, constraint) {
            BuildResult::Built { key, kind, node } => {
                if self.pool.contains_key(key) {
                    // Invariant breach: last write wins, the pooled copy goes.
                    warn!("dropping pooled duplicate of freshly built {key:?}");
                    self.pool.take(key);
                }
                let prev = self.cached.insert(
                    index,
                    CachedItem {
                        key,
                        kind,
                        node: Some(node),
                    },
                );
                if let Some(prev) = prev {
                    if prev.key != key {
                        if let Some(prev_node) = prev.node {
                            // The slot changed identity; keep the old item
                            // reusable by key rather than dropping it.
                            self.pool.insert(
                                prev.key,
                                PooledItem {
                                    index_hint: None,
                                    kind: prev.kind,
                                    node: prev_node,
                                },
                            );
                        }
                    }
                }
                trace!("built {key:?} at index {index}");
                true
            }
            BuildResult::Pending { key } => {
                match self.cached.get_mut(&index) {
                    Some(entry) => entry.key = key,
                    None => {
                        self.cached.insert(
                            index,
                            CachedItem {
                                key,
                                kind: ItemKind::default(),
                                node: None,
                            },
                        );
                    }
                }
                trace!("build pending for {key:?} at index {index}");
                true
            }
            BuildResult::OutOfRange => {
                trace!("build raced out of range at index {index}");
                false
            }
        }
    }

    /// The whole data set was replaced. Every handle is demoted to the pool
    /// under its old key with no index hint, and the one-shot exit
    /// transition flag is set.
    pub fn on_data_reloaded(&mut self) {
        let drained = std::mem::take(&mut self.cached);
        for (_, entry) in drained {
            if let Some(node) = entry.node {
                if self
                    .pool
                    .insert(
                        entry.key,
                        PooledItem {
                            index_hint: None,
                            kind: entry.kind,
                            node,
                        },
                    )
                    .is_some()
                {
                    warn!("reload displaced a pooled duplicate of {:?}", entry.key);
                }
            }
        }
        self.transition_pending = true;
        debug!("data reloaded; {} items parked for reuse", self.pool.len());
    }

    /// An item was inserted at `insert_index`; pure re-indexing.
    pub fn on_data_added(&mut self, insert_index: usize) {
        let tail: Vec<(usize, CachedItem<F::Item>)> =
            self.cached.split_off(&insert_index).into_iter().collect();
        for (index, entry) in tail {
            self.cached.insert(index + 1, entry);
        }
        self.pool.shift_hints_for_insert(insert_index);
    }

    /// The item at `delete_index` was removed. Returns its handle (if built)
    /// so the caller can run removal handling; higher entries shift down.
    pub fn on_data_deleted(&mut self, delete_index: usize) -> Option<F::Item> {
        let mut tail = self.cached.split_off(&delete_index);
        let removed = tail.remove(&delete_index);
        for (index, entry) in tail {
            self.cached.insert(index - 1, entry);
        }
        self.pool.shift_hints_for_delete(delete_index);
        removed.and_then(|entry| entry.node)
    }

    /// The item at `change_index` changed in place. A built handle is
    /// demoted for key-based reuse and the slot is cleared so the next
    /// access rebuilds. Returns whether a rebuild is required.
    pub fn on_data_changed(&mut self, change_index: usize) -> bool {
        let Some(entry) = self.cached.remove(&change_index) else {
            return false;
        };
        if let Some(node) = entry.node {
            self.pool.insert(
                entry.key,
                PooledItem {
                    index_hint: None,
                    kind: entry.kind,
                    node,
                },
            );
            trace!("demoted changed {:?} from index {change_index}", entry.key);
        }
        true
    }

    /// The items at `from` and `to` exchanged positions. Handles are swapped
    /// when both sides are cached; a lone cached side is demoted under the
    /// index it now occupies. A handle is never dropped here.
    pub fn on_data_moved(&mut self, from: usize, to: usize) {
        if from == to {
            return;
        }
        let a = self.cached.remove(&from);
        let b = self.cached.remove(&to);
        match (a, b) {
            (Some(a), Some(b)) => {
                self.cached.insert(from, b);
                self.cached.insert(to, a);
            }
            (Some(entry), None) => self.demote_moved(entry, to),
            (None, Some(entry)) => self.demote_moved(entry, from),
            (None, None) => {}
        }
    }

    fn demote_moved(&mut self, entry: CachedItem<F::Item>, new_index: usize) {
        if let Some(node) = entry.node {
            self.pool.insert(
                entry.key,
                PooledItem {
                    index_hint: Some(new_index),
                    kind: entry.kind,
                    node,
                },
            );
            trace!("demoted moved {:?} under hint {new_index}", entry.key);
        }
    }

    /// Produces the live children for this pass, in index order.
    ///
    /// Entries whose item the host reports inactive are demoted to the pool
    /// under their old index and excluded. Handles displaced by a
    /// last-write-wins key collision are surfaced through `on_detached` for
    /// explicit teardown. The active window is recomputed from the
    /// survivors, loop-aware.
    pub fn collect_items<P, D>(
        &mut self,
        mut is_active: P,
        mut on_detached: D,
    ) -> Vec<(usize, ItemKey, F::Item)>
    where
        F::Item: Clone,
        P: FnMut(&F::Item) -> bool,
        D: FnMut(F::Item),
    {
        let mut demote: SmallVec<[usize; 8]> = SmallVec::new();
        for (&index, entry) in &self.cached {
            if let Some(node) = &entry.node {
                if !is_active(node) {
                    demote.push(index);
                }
            }
        }
        for index in demote {
            let Some(entry) = self.cached.remove(&index) else {
                continue;
            };
            let Some(node) = entry.node else { continue };
            trace!("demoted inactive {:?} from index {index}", entry.key);
            let displaced = self.pool.insert(
                entry.key,
                PooledItem {
                    index_hint: Some(index),
                    kind: entry.kind,
                    node,
                },
            );
            if let Some(displaced) = displaced {
                warn!("key collision in pool for {:?}; detaching older item", entry.key);
                on_detached(displaced.node);
            }
        }
        let items: Vec<(usize, ItemKey, F::Item)> = self
            .cached
            .iter()
            .filter_map(|(&index, entry)| {
                entry
                    .node
                    .as_ref()
                    .map(|node| (index, entry.key, node.clone()))
            })
            .collect();
        self.window
            .recompute(items.iter().map(|(index, _, _)| *index), self.spec.is_loop);
        items
    }

    /// Deadline-bounded prebuild sweep. Returns `true` when every idle index
    /// around the window was materialized.
    ///
    /// Constraint-bound work is refused outright unless the host allows long
    /// prediction tasks. An interrupted sweep keeps pool leftovers for the
    /// next attempt; a completed sweep evicts entries whose stale index hint
    /// can no longer be reclaimed.
    pub fn pre_build(
        &mut self,
        deadline: Instant,
        constraint: Option<&ItemConstraint>,
        can_run_long_predict_task: bool,
    ) -> bool {
        if constraint.is_some() && !can_run_long_predict_task {
            debug!("prebuild refused: constraint-bound work needs a long-task allowance");
            return false;
        }
        if self.window.is_empty() {
            // Nothing on screen yet; with no window there is nothing to
            // judge stale either.
            return true;
        }
        let total = self.factory.total_count();
        let cached = &self.cached;
        let idle = self.window.idle_indices(self.spec.cached_count, total, self.spec.is_loop, |i| {
            cached.get(&i).is_some_and(|entry| entry.node.is_some())
        });

        let mut remaining: SmallVec<[usize; 8]> = SmallVec::new();
        for index in idle {
            if let Some((key, pooled)) = self.pool.take_by_hint(index) {
                trace!("prebuild reclaimed {key:?} at index {index}");
                self.cached.insert(
                    index,
                    CachedItem {
                        key,
                        kind: pooled.kind,
                        node: Some(pooled.node),
                    },
                );
            } else {
                remaining.push(index);
            }
        }
        for index in remaining {
            if Instant::now() >= deadline {
                debug!("prebuild deadline reached before index {index}");
                return false;
            }
            self.build_into(index, constraint);
        }
        self.pool.evict_hinted();
        true
    }

    /// Eagerly builds every index when the factory opts in; a no-op
    /// otherwise.
    pub fn expand_all(&mut self) {
        if !self.factory.expand_all_on_initial() {
            return;
        }
        for index in 0..self.factory.total_count() {
            let built = self
                .cached
                .get(&index)
                .is_some_and(|entry| entry.node.is_some());
            if !built {
                self.build_into(index, None);
            }
        }
        debug!("expanded all {} items eagerly", self.cached.len());
    }

    /// Full teardown that retains fast re-show: every entry is demoted to
    /// the pool keyed under its own index, with `mark_inactive` invoked on
    /// each handle on the way out.
    pub fn remove_all_children<M>(&mut self, mut mark_inactive: M)
    where
        M: FnMut(&F::Item),
    {
        let drained = std::mem::take(&mut self.cached);
        for (index, entry) in drained {
            if let Some(node) = entry.node {
                mark_inactive(&node);
                self.pool.insert(
                    entry.key,
                    PooledItem {
                        index_hint: Some(index),
                        kind: entry.kind,
                        node,
                    },
                );
            }
        }
        self.window.clear();
        debug!("removed all children; {} items parked", self.pool.len());
    }
}
