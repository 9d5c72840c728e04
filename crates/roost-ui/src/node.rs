//! The virtualization node.
//!
//! [`VirtualizationNode`] adapts an [`ItemCache`] to the host UI tree: it
//! exposes count/child-by-index, forwards data-source mutations, keeps the
//! background prebuild task scheduled while there is work left, and tracks
//! the data-change listener registration across attach/detach transitions.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use log::{debug, trace};
use web_time::Instant;

use roost_foundation::virtualize::{
    DataChangeListener, DataChangeNotifier, ItemCache, ItemConstraint, ItemFactory, ItemKey,
    VirtualizeSpec,
};

use crate::scheduler::IdleScheduler;
use crate::tree::{HostNodeId, ItemFlag, TreeAdapter, VirtualContext};

/// Background prebuild task state.
///
/// `Idle --request--> Scheduled`; an incomplete sweep re-posts itself and
/// stays `Scheduled`, a complete one returns to `Idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PrebuildTask {
    Idle,
    Scheduled,
}

struct NodeInner<A, F>
where
    A: TreeAdapter,
    F: ItemFactory<Item = A::Node>,
{
    id: HostNodeId,
    adapter: Rc<A>,
    scheduler: Rc<dyn IdleScheduler>,
    spec: VirtualizeSpec,
    cache: Option<ItemCache<F>>,
    task: PrebuildTask,
    constraint_hint: Option<ItemConstraint>,
    long_task_requested: bool,
    listener_id: Option<u64>,
}

/// Adapts the virtualization cache to the host UI tree.
///
/// Clone-able handle over shared state; clones refer to the same node. All
/// work runs on the single logical update thread.
pub struct VirtualizationNode<A, F>
where
    A: TreeAdapter,
    F: ItemFactory<Item = A::Node>,
{
    inner: Rc<RefCell<NodeInner<A, F>>>,
}

impl<A, F> Clone for VirtualizationNode<A, F>
where
    A: TreeAdapter,
    F: ItemFactory<Item = A::Node>,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A, F> VirtualizationNode<A, F>
where
    A: TreeAdapter + 'static,
    F: ItemFactory<Item = A::Node> + 'static,
{
    /// Creates an unconfigured node; attach a factory with
    /// [`VirtualizationNode::set_factory`] before serving children.
    pub fn new(context: &VirtualContext, adapter: Rc<A>, spec: VirtualizeSpec) -> Self {
        Self {
            inner: Rc::new(RefCell::new(NodeInner {
                id: context.next_node_id(),
                adapter,
                scheduler: context.scheduler(),
                spec,
                cache: None,
                task: PrebuildTask::Idle,
                constraint_hint: None,
                long_task_requested: false,
                listener_id: None,
            })),
        }
    }

    pub fn id(&self) -> HostNodeId {
        self.inner.borrow().id
    }

    /// Attaches (or swaps) the backing factory. A swap discards all cached
    /// and expiring state; stale items never cross a factory swap.
    pub fn set_factory(&self, factory: F) {
        let adapter = {
            let mut inner = self.inner.borrow_mut();
            let spec = inner.spec;
            match inner.cache.as_mut() {
                Some(cache) => cache.set_factory(factory),
                None => inner.cache = Some(ItemCache::new(factory, spec)),
            }
            inner.adapter.clone()
        };
        adapter.notify_content_changed_from(0);
        adapter.mark_subtree_dirty();
    }

    /// Total item count; zero while unconfigured.
    pub fn frame_count(&self) -> usize {
        self.inner
            .borrow()
            .cache
            .as_ref()
            .map(|cache| cache.total_count())
            .unwrap_or(0)
    }

    /// Serves the child at `index`, building it if allowed.
    ///
    /// A handle-bearing hit is marked active, reparented under this node,
    /// and the subtree is marked dirty; every call keeps the background
    /// prebuild pass scheduled.
    pub fn frame_child_by_index(
        &self,
        index: usize,
        need_build: bool,
    ) -> Option<(ItemKey, Option<A::Node>)>
    where
        A::Node: Clone,
    {
        let (result, adapter, id) = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.id;
            let adapter = inner.adapter.clone();
            let cache = inner.cache.as_mut()?;
            let result = cache
                .get_child_by_index(index, need_build)
                .map(|(key, node)| (key, node.cloned()));
            (result, adapter, id)
        };
        if let Some((key, Some(node))) = &result {
            adapter.mark_item_active(node, true);
            adapter.reparent_item(node, id);
            adapter.mark_subtree_dirty();
            trace!("frame child {key:?} served at index {index}");
        }
        self.schedule_prebuild();
        result
    }

    /// Produces the live children for this pass, in index order.
    ///
    /// Items the host reports inactive are demoted for reuse; handles
    /// displaced by key collisions are marked inactive and handed back to
    /// the host tree for teardown.
    pub fn collect_live_children(&self) -> IndexMap<usize, (ItemKey, A::Node)>
    where
        A::Node: Clone,
    {
        let mut inner = self.inner.borrow_mut();
        let NodeInner { adapter, cache, .. } = &mut *inner;
        let Some(cache) = cache.as_mut() else {
            return IndexMap::new();
        };
        let adapter = adapter.clone();
        cache
            .collect_items(
                |node| adapter.is_item_active(node),
                |node| adapter.mark_item_active(&node, false),
            )
            .into_iter()
            .map(|(index, key, node)| (index, (key, node)))
            .collect()
    }

    /// Maps a built item back to its logical index by scanning the current
    /// active window.
    pub fn index_of_item(&self, item: HostNodeId) -> Option<usize> {
        let inner = self.inner.borrow();
        let cache = inner.cache.as_ref()?;
        let window = cache.window();
        let index = cache
            .built_items()
            .find(|(index, _, node)| window.contains(*index) && inner.adapter.item_id(node) == item)
            .map(|(index, _, _)| index);
        index
    }

    /// Requests a constraint-bound prediction pass. The constraint is held
    /// until a prebuild sweep completes under a long-task allowance.
    pub fn request_long_predict_task(&self, constraint: ItemConstraint) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.constraint_hint = Some(constraint);
            inner.long_task_requested = true;
        }
        self.schedule_prebuild();
    }

    /// Constraint hint pending for the next completed prebuild, if any.
    pub fn pending_constraint(&self) -> Option<ItemConstraint> {
        self.inner.borrow().constraint_hint
    }

    /// Whether a prebuild task is currently scheduled.
    pub fn is_prebuild_scheduled(&self) -> bool {
        self.inner.borrow().task == PrebuildTask::Scheduled
    }

    /// Consumes the one-shot exit-transition flag set by a reload.
    pub fn take_transition_pending(&self) -> bool {
        let mut inner = self.inner.borrow_mut();
        inner
            .cache
            .as_mut()
            .map(|cache| cache.take_transition_pending())
            .unwrap_or(false)
    }

    /// Applies `flag` to every currently built child.
    pub fn set_flag_for_generated_items(&self, flag: ItemFlag) {
        let inner = self.inner.borrow();
        if let Some(cache) = inner.cache.as_ref() {
            let adapter = inner.adapter.clone();
            cache.set_flag_for_generated_items(|node| adapter.apply_item_flag(node, flag));
        }
    }

    /// Full teardown retaining fast re-show: children are demoted through
    /// the cache and marked inactive in the host tree.
    pub fn remove_all_children(&self) {
        let adapter = {
            let mut inner = self.inner.borrow_mut();
            let NodeInner { adapter, cache, .. } = &mut *inner;
            if let Some(cache) = cache.as_mut() {
                let adapter = adapter.clone();
                cache.remove_all_children(|node| adapter.mark_item_active(node, false));
            }
            adapter.clone()
        };
        adapter.mark_subtree_dirty();
    }

    /// Registers as a data-change listener on entering the main tree.
    /// Repeated attaches without a detach register once.
    pub fn on_attach_to_main_tree(&self, notifier: &DataChangeNotifier) {
        self.ensure_registered(notifier);
    }

    /// Unregisters from the data source on leaving the main tree.
    pub fn on_detach_from_main_tree(&self, notifier: &DataChangeNotifier) {
        let id = self.inner.borrow_mut().listener_id.take();
        if let Some(id) = id {
            notifier.remove_listener(id);
            debug!("node {} unregistered data listener", self.id());
        }
    }

    /// Off-screen processing still tracks source mutations, so entering it
    /// re-registers the listener.
    pub fn on_offscreen_process(&self, notifier: &DataChangeNotifier) {
        self.ensure_registered(notifier);
    }

    fn ensure_registered(&self, notifier: &DataChangeNotifier) {
        if self.inner.borrow().listener_id.is_some() {
            return;
        }
        let id = notifier.add_listener(Box::new(self.clone()));
        self.inner.borrow_mut().listener_id = Some(id);
        debug!("node {} registered data listener", self.id());
    }

    fn schedule_prebuild(&self) {
        let scheduler = {
            let mut inner = self.inner.borrow_mut();
            if inner.cache.is_none() || inner.task == PrebuildTask::Scheduled {
                return;
            }
            inner.task = PrebuildTask::Scheduled;
            inner.scheduler.clone()
        };
        let node = self.clone();
        scheduler.post_idle_task(Box::new(move |deadline, can_run_long| {
            node.run_prebuild(deadline, can_run_long);
        }));
    }

    fn run_prebuild(&self, deadline: Instant, can_run_long_task: bool) {
        let completed = {
            let mut inner = self.inner.borrow_mut();
            let constraint = if inner.long_task_requested {
                inner.constraint_hint
            } else {
                None
            };
            let Some(cache) = inner.cache.as_mut() else {
                inner.task = PrebuildTask::Idle;
                return;
            };
            cache.pre_build(deadline, constraint.as_ref(), can_run_long_task)
        };
        if completed {
            let mut inner = self.inner.borrow_mut();
            inner.task = PrebuildTask::Idle;
            inner.constraint_hint = None;
            inner.long_task_requested = false;
            trace!("prebuild pass complete");
        } else {
            let scheduler = self.inner.borrow().scheduler.clone();
            let node = self.clone();
            scheduler.post_idle_task(Box::new(move |deadline, can_run_long| {
                node.run_prebuild(deadline, can_run_long);
            }));
            trace!("prebuild pass incomplete; re-posted");
        }
    }

    fn forward_mutation<M>(&self, mutate: M, affected_from: usize)
    where
        M: FnOnce(&mut ItemCache<F>) -> Option<A::Node>,
    {
        let (adapter, removed) = {
            let mut inner = self.inner.borrow_mut();
            let adapter = inner.adapter.clone();
            let removed = inner.cache.as_mut().and_then(mutate);
            (adapter, removed)
        };
        if let Some(node) = removed {
            // Removal handling: the handle leaves the tree for good.
            adapter.mark_item_active(&node, false);
        }
        adapter.notify_content_changed_from(affected_from);
        adapter.mark_subtree_dirty();
    }
}

impl<A, F> DataChangeListener for VirtualizationNode<A, F>
where
    A: TreeAdapter + 'static,
    F: ItemFactory<Item = A::Node> + 'static,
{
    fn on_data_reloaded(&self) {
        self.forward_mutation(
            |cache| {
                cache.on_data_reloaded();
                None
            },
            0,
        );
    }

    fn on_data_added(&self, index: usize) {
        self.forward_mutation(
            |cache| {
                cache.on_data_added(index);
                None
            },
            index,
        );
    }

    fn on_data_deleted(&self, index: usize) {
        self.forward_mutation(|cache| cache.on_data_deleted(index), index);
    }

    fn on_data_changed(&self, index: usize) {
        self.forward_mutation(
            |cache| {
                cache.on_data_changed(index);
                None
            },
            index,
        );
    }

    fn on_data_moved(&self, from: usize, to: usize) {
        self.forward_mutation(
            |cache| {
                cache.on_data_moved(from, to);
                None
            },
            from.min(to),
        );
    }
}
