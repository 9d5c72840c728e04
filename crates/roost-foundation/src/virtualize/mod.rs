//! Lazy virtualization core.
//!
//! Decouples a backing data source of unknown size from the items actually
//! built: only items near the active viewport are materialized, items that
//! scroll out of view are parked in an expiring pool for reuse, and a
//! deadline-bounded prebuild sweep fills a fixed radius around the window
//! between frames.

mod cache;
mod expiring;
mod factory;
mod listener;
mod window;

pub use cache::{CachedItem, ItemCache};
pub use expiring::{ExpiringPool, PooledItem};
pub use factory::{BuildResult, ItemConstraint, ItemFactory, ItemKey, ItemKind};
pub use listener::{DataChangeListener, DataChangeNotifier};
pub use window::ActiveWindow;

/// Default number of items to prebuild on each side of the active window.
pub const DEFAULT_CACHED_COUNT: usize = 2;

/// Configuration for a virtualization cache.
///
/// Fixed for the cache's lifetime unless explicitly reconfigured through
/// [`ItemCache::set_spec`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VirtualizeSpec {
    /// Number of items to materialize beyond each end of the active window.
    /// Higher values reduce jank during fast scrolling but use more memory.
    pub cached_count: usize,

    /// Whether the collection wraps around (index arithmetic is modular).
    pub is_loop: bool,
}

impl Default for VirtualizeSpec {
    fn default() -> Self {
        Self {
            cached_count: DEFAULT_CACHED_COUNT,
            is_loop: false,
        }
    }
}

impl VirtualizeSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached_count(mut self, count: usize) -> Self {
        self.cached_count = count;
        self
    }

    pub fn looped(mut self, is_loop: bool) -> Self {
        self.is_loop = is_loop;
        self
    }
}
