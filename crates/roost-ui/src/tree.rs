//! Host tree contracts.
//!
//! The virtualization layer never touches the render tree directly; it goes
//! through [`TreeAdapter`]. Ids are never allocated from global statics;
//! the embedding hands it a [`VirtualContext`] at construction time.

use std::cell::RefCell;
use std::rc::Rc;

use crate::scheduler::IdleScheduler;

/// Identifier of a node in the host UI tree.
pub type HostNodeId = u64;

/// Invalidation flag propagated to built items.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ItemFlag(u8);

impl ItemFlag {
    pub const MEASURE: Self = Self(1 << 0);
    pub const RENDER: Self = Self(1 << 1);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Operations the host tree exposes to the virtualization node.
///
/// Items are referred to by handle; the adapter resolves ownership through
/// the id/slot the handle carries, never through back-pointers into the
/// node. Adapter callbacks must not re-enter the node that invoked them.
pub trait TreeAdapter {
    /// The host item handle type. Typically a cheap `Rc`-like handle.
    type Node;

    /// Stable host id of the item, used to map a built item back to its
    /// logical index.
    fn item_id(&self, node: &Self::Node) -> HostNodeId;

    /// Whether the item is still live in the host tree.
    fn is_item_active(&self, node: &Self::Node) -> bool;

    fn mark_item_active(&self, node: &Self::Node, active: bool);

    /// Moves the item under a new parent in the host tree.
    fn reparent_item(&self, node: &Self::Node, new_parent: HostNodeId);

    /// Content changed from `index` onward; downstream layout only needs to
    /// invalidate the affected suffix.
    fn notify_content_changed_from(&self, index: usize);

    /// Marks the subtree owning the virtualized children dirty for the next
    /// frame.
    fn mark_subtree_dirty(&self);

    /// Applies an invalidation flag to a built item.
    fn apply_item_flag(&self, node: &Self::Node, flag: ItemFlag);
}

struct ContextInner {
    next_node_id: HostNodeId,
    scheduler: Rc<dyn IdleScheduler>,
}

/// Explicit construction context for virtualization nodes.
///
/// Owns id allocation and the idle scheduler handle for the subsystem that
/// created it; cloning shares the same allocator.
#[derive(Clone)]
pub struct VirtualContext {
    inner: Rc<RefCell<ContextInner>>,
}

impl VirtualContext {
    pub fn new(scheduler: Rc<dyn IdleScheduler>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ContextInner {
                next_node_id: 0,
                scheduler,
            })),
        }
    }

    /// Allocates a fresh host node id.
    pub fn next_node_id(&self) -> HostNodeId {
        let mut inner = self.inner.borrow_mut();
        inner.next_node_id += 1;
        inner.next_node_id
    }

    pub fn scheduler(&self) -> Rc<dyn IdleScheduler> {
        self.inner.borrow().scheduler.clone()
    }
}
