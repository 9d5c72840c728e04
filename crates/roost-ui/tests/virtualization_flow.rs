//! End-to-end virtualization flow: a node over a mutable keyed data source,
//! driven through a manually pumped idle scheduler.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use web_time::Instant;

use roost_ui::{
    BuildResult, DataChangeNotifier, ExpiringPool, HostNodeId, ItemConstraint, ItemFactory,
    ItemFlag, ItemKey, ItemKind, ManualScheduler, TreeAdapter, VirtualContext, VirtualizationNode,
    VirtualizeSpec,
};

struct Row {
    key: u64,
    active: Cell<bool>,
}

type Handle = Rc<Row>;

/// Keyed data source; the test mutates `keys` and then notifies, the same
/// order a real source would.
struct RowSource {
    keys: Rc<RefCell<Vec<u64>>>,
    builds: Rc<Cell<usize>>,
    reuses: Rc<Cell<usize>>,
}

impl ItemFactory for RowSource {
    type Item = Handle;

    fn total_count(&self) -> usize {
        self.keys.borrow().len()
    }

    fn build_item(
        &mut self,
        index: usize,
        pool: &mut ExpiringPool<Handle>,
        _constraint: Option<&ItemConstraint>,
    ) -> BuildResult<Handle> {
        let Some(&key) = self.keys.borrow().get(index) else {
            return BuildResult::OutOfRange;
        };
        let key = ItemKey(key);
        if let Some(pooled) = pool.take(key) {
            self.reuses.set(self.reuses.get() + 1);
            return BuildResult::Built {
                key,
                kind: pooled.kind,
                node: pooled.node,
            };
        }
        self.builds.set(self.builds.get() + 1);
        BuildResult::Built {
            key,
            kind: ItemKind::Leaf,
            node: Rc::new(Row {
                key: key.0,
                active: Cell::new(true),
            }),
        }
    }
}

#[derive(Default)]
struct HostTree {
    dirty_marks: Cell<usize>,
    changed_from: RefCell<Vec<usize>>,
}

impl TreeAdapter for HostTree {
    type Node = Handle;

    fn item_id(&self, node: &Handle) -> HostNodeId {
        node.key
    }

    fn is_item_active(&self, node: &Handle) -> bool {
        node.active.get()
    }

    fn mark_item_active(&self, node: &Handle, active: bool) {
        node.active.set(active);
    }

    fn reparent_item(&self, _node: &Handle, _new_parent: HostNodeId) {}

    fn notify_content_changed_from(&self, index: usize) {
        self.changed_from.borrow_mut().push(index);
    }

    fn mark_subtree_dirty(&self) {
        self.dirty_marks.set(self.dirty_marks.get() + 1);
    }

    fn apply_item_flag(&self, _node: &Handle, _flag: ItemFlag) {}
}

struct Harness {
    node: VirtualizationNode<HostTree, RowSource>,
    adapter: Rc<HostTree>,
    scheduler: Rc<ManualScheduler>,
    keys: Rc<RefCell<Vec<u64>>>,
    builds: Rc<Cell<usize>>,
    reuses: Rc<Cell<usize>>,
}

fn harness(count: usize, spec: VirtualizeSpec) -> Harness {
    let scheduler = Rc::new(ManualScheduler::new());
    let context = VirtualContext::new(scheduler.clone());
    let adapter = Rc::new(HostTree::default());
    let node = VirtualizationNode::new(&context, adapter.clone(), spec);

    let keys = Rc::new(RefCell::new((0..count as u64).map(|i| 500 + i).collect()));
    let builds = Rc::new(Cell::new(0));
    let reuses = Rc::new(Cell::new(0));
    node.set_factory(RowSource {
        keys: keys.clone(),
        builds: builds.clone(),
        reuses: reuses.clone(),
    });
    Harness {
        node,
        adapter,
        scheduler,
        keys,
        builds,
        reuses,
    }
}

fn generous() -> Instant {
    Instant::now() + Duration::from_secs(60)
}

#[test]
fn frame_then_prebuild_materializes_exact_radius() {
    let h = harness(100, VirtualizeSpec::default());

    let (key, node) = h.node.frame_child_by_index(10, true).unwrap();
    assert_eq!(key, ItemKey(510));
    assert!(node.is_some());
    assert_eq!(h.builds.get(), 1);

    assert!(h.scheduler.pump_one(generous(), false));
    assert_eq!(h.builds.get(), 5);

    // Indices 8..=12 are served as cached hits, nothing beyond them built.
    for index in 8..=12 {
        let (key, node) = h.node.frame_child_by_index(index, false).unwrap();
        assert_eq!(key, ItemKey(500 + index as u64));
        assert!(node.is_some());
    }
    assert_eq!(h.builds.get(), 5);
    assert!(h.node.frame_child_by_index(7, false).is_none());
}

#[test]
fn deadline_expiry_reposts_until_done() {
    let h = harness(100, VirtualizeSpec::new().cached_count(4));
    let notifier = DataChangeNotifier::new();
    h.node.on_attach_to_main_tree(&notifier);

    h.node.frame_child_by_index(50, true);

    // Already-expired deadlines make no progress but keep the task alive.
    let mut rounds = 0;
    while h.node.is_prebuild_scheduled() && rounds < 3 {
        h.scheduler.pump_one(Instant::now() - Duration::from_millis(1), false);
        rounds += 1;
    }
    assert!(h.node.is_prebuild_scheduled());
    assert_eq!(h.builds.get(), 1);

    let ran = h.scheduler.pump_all(generous(), false, 16);
    assert!(ran >= 1);
    assert!(!h.node.is_prebuild_scheduled());
    assert_eq!(h.builds.get(), 9); // 46..=54
}

#[test]
fn delete_shifts_cached_items_down_without_rebuild() {
    let h = harness(100, VirtualizeSpec::default());
    let notifier = DataChangeNotifier::new();
    h.node.on_attach_to_main_tree(&notifier);

    h.node.frame_child_by_index(10, true);
    h.scheduler.pump_all(generous(), false, 16);
    let built = h.builds.get();

    h.keys.borrow_mut().remove(10);
    notifier.notify_deleted(10);

    // The old index 11 answers at 10 now, straight from the cache table.
    let (key, node) = h.node.frame_child_by_index(10, false).unwrap();
    assert_eq!(key, ItemKey(511));
    assert!(node.is_some());
    assert_eq!(h.builds.get(), built);
    assert_eq!(
        h.adapter.changed_from.borrow().last().copied(),
        Some(10)
    );
}

#[test]
fn reload_recycles_surviving_keys() {
    let h = harness(100, VirtualizeSpec::default());
    let notifier = DataChangeNotifier::new();
    h.node.on_attach_to_main_tree(&notifier);

    h.node.frame_child_by_index(10, true);
    h.scheduler.pump_all(generous(), false, 16);
    let built = h.builds.get();

    // Same keys after the reload, so every lookup is a pooled reuse.
    notifier.notify_reloaded();
    assert!(h.node.take_transition_pending());

    let (key, node) = h.node.frame_child_by_index(10, true).unwrap();
    assert_eq!(key, ItemKey(510));
    assert!(node.is_some());
    assert_eq!(h.builds.get(), built);
    assert_eq!(h.reuses.get(), 1);
}

#[test]
fn detach_stops_mutation_delivery() {
    let h = harness(100, VirtualizeSpec::default());
    let notifier = DataChangeNotifier::new();
    h.node.on_attach_to_main_tree(&notifier);
    h.node.frame_child_by_index(10, true);

    h.node.on_detach_from_main_tree(&notifier);
    h.keys.borrow_mut().remove(10);
    notifier.notify_deleted(10);

    // The cache never heard about the delete; index 10 still serves its
    // original key from the table.
    let (key, _) = h.node.frame_child_by_index(10, false).unwrap();
    assert_eq!(key, ItemKey(510));
}

#[test]
fn long_predict_pass_applies_constraint_once_allowed() {
    let h = harness(100, VirtualizeSpec::default());
    h.node.frame_child_by_index(10, true);
    h.node
        .request_long_predict_task(ItemConstraint::fixed(360.0, 64.0));

    h.scheduler.pump_one(generous(), false);
    assert!(h.node.is_prebuild_scheduled());

    h.scheduler.pump_one(generous(), true);
    assert!(!h.node.is_prebuild_scheduled());
    assert!(h.node.pending_constraint().is_none());
    assert_eq!(h.builds.get(), 5);
}

#[test]
fn collect_live_children_reports_window_in_order() {
    let h = harness(100, VirtualizeSpec::default());
    h.node.frame_child_by_index(10, true);
    h.node.frame_child_by_index(11, true);
    h.scheduler.pump_all(generous(), false, 16);

    let live = h.node.collect_live_children();
    let indices: Vec<usize> = live.keys().copied().collect();
    assert_eq!(indices, vec![8, 9, 10, 11, 12, 13]);
    assert_eq!(h.node.index_of_item(510), Some(10));
}
