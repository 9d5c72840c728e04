//! Host-tree adapter layer for Roost.
//!
//! Adapts the virtualization cache in `roost-foundation` to a concrete UI
//! tree: [`VirtualizationNode`] exposes count/child-by-index to the host,
//! forwards data-source mutations, and drives the background prebuild task
//! through the host's idle scheduler.

pub mod node;
pub mod scheduler;
pub mod tree;

pub use node::VirtualizationNode;
pub use scheduler::{IdleScheduler, IdleTask, ManualScheduler};
pub use tree::{HostNodeId, ItemFlag, TreeAdapter, VirtualContext};

// Re-export the foundation surface so hosts depend on one crate.
pub use roost_foundation::virtualize::{
    BuildResult, DataChangeListener, DataChangeNotifier, ExpiringPool, ItemCache, ItemConstraint,
    ItemFactory, ItemKey, ItemKind, VirtualizeSpec, DEFAULT_CACHED_COUNT,
};
