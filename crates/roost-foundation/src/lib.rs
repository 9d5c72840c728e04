//! Foundation layer for Roost: the virtualization cache core.
//!
//! This crate owns everything below the host UI tree: the item factory
//! contract, the expiring pool that recycles evicted items, the active
//! window bookkeeping, and [`virtualize::ItemCache`] itself. It has no
//! knowledge of how items are rendered or laid out; those concerns live
//! behind the adapter traits in `roost-ui`.

pub mod virtualize;

pub use virtualize::{
    ActiveWindow, BuildResult, CachedItem, DataChangeListener, DataChangeNotifier, ExpiringPool,
    ItemCache, ItemConstraint, ItemFactory, ItemKey, ItemKind, PooledItem, VirtualizeSpec,
    DEFAULT_CACHED_COUNT,
};
