//! Item factory contract for virtualized collections.
//!
//! The factory is the external collaborator that turns an index into a
//! concrete item plus a stable key. Implementations should answer from the
//! supplied [`ExpiringPool`] when a matching key is parked there instead of
//! building from scratch.

use super::expiring::ExpiringPool;

/// Stable per-item identifier, independent of position.
///
/// Assigned by the factory and unique among currently cached plus expiring
/// items. Keys survive index shifts from inserts, deletes, and moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey(pub u64);

/// Capability of a built item, resolved once at build time.
///
/// Stored alongside the cache entry so consumers never need repeated
/// runtime type inspection of the item itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ItemKind {
    /// A single leaf item.
    #[default]
    Leaf,
    /// A group that expands into multiple host children.
    Group,
}

/// Layout constraint hint forwarded to constraint-bound prebuild work.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ItemConstraint {
    pub min_width: f32,
    pub max_width: f32,
    pub min_height: f32,
    pub max_height: f32,
}

impl ItemConstraint {
    /// A tight constraint with fixed width and height.
    pub fn fixed(width: f32, height: f32) -> Self {
        Self {
            min_width: width,
            max_width: width,
            min_height: height,
            max_height: height,
        }
    }
}

/// Outcome of a single build request.
///
/// Build failures never surface as panics or errors; they degrade to
/// [`BuildResult::Pending`] or [`BuildResult::OutOfRange`] and the caller
/// retries on a later pass.
#[derive(Debug)]
pub enum BuildResult<N> {
    /// The item was built (or recycled from the pool).
    Built {
        key: ItemKey,
        kind: ItemKind,
        node: N,
    },
    /// The key is known but the item cannot be built right now; the slot is
    /// promised and a later access will retry.
    Pending { key: ItemKey },
    /// The index raced out of range under a concurrent-looking mutation.
    OutOfRange,
}

/// Produces items for a virtualized collection.
///
/// Implemented by the caller embedding the cache. `build_item` may satisfy
/// a request by taking a matching key out of `pool`; the cache passes its
/// own expiring pool through on every build so recycling stays transparent.
pub trait ItemFactory {
    /// The host item handle type. Typically a cheap `Rc`-like handle; the
    /// cache holds one owning copy while an item is materialized.
    type Item;

    /// Total number of items in the backing collection, visible or not.
    /// Idempotent between mutation notifications.
    fn total_count(&self) -> usize;

    /// Builds (or recycles) the item at `index`.
    ///
    /// `constraint` is only supplied during constraint-bound prebuild; a
    /// regular frame-driven build passes `None`.
    fn build_item(
        &mut self,
        index: usize,
        pool: &mut ExpiringPool<Self::Item>,
        constraint: Option<&ItemConstraint>,
    ) -> BuildResult<Self::Item>;

    /// Whether every index should be built eagerly on first configuration.
    /// Only sensible for small, non-lazy collections.
    fn expand_all_on_initial(&self) -> bool {
        false
    }
}
