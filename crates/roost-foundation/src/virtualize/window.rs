//! Active window bookkeeping.
//!
//! The active window is the (possibly loop-wrapped) index range currently
//! materialized as live children. It is recomputed from the sorted indices
//! of each live-children pass; for looping collections the first gap
//! greater than one in sorted order marks the wrap boundary.

use smallvec::SmallVec;

/// Scratch capacity for idle-index enumeration; radii are small.
type IdleIndexes = SmallVec<[usize; 8]>;

/// The index range currently materialized as live children.
///
/// `start > end` encodes a loop-wrapped window (e.g. `{98, 99, 0, 1}` is
/// `start: 98, end: 1`). An empty window materializes nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActiveWindow {
    range: Option<(usize, usize)>,
}

impl ActiveWindow {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_none()
    }

    pub fn bounds(&self) -> Option<(usize, usize)> {
        self.range
    }

    pub fn clear(&mut self) {
        self.range = None;
    }

    /// Whether `index` lies inside the window, loop-wrap aware.
    pub fn contains(&self, index: usize) -> bool {
        match self.range {
            None => false,
            Some((start, end)) if start <= end => index >= start && index <= end,
            Some((start, end)) => index >= start || index <= end,
        }
    }

    /// Grows the window to cover `index`, used by the frame-driven lookup
    /// path. A wrapped window grows on whichever side is nearer.
    pub fn extend_to(&mut self, index: usize) {
        match self.range {
            None => self.range = Some((index, index)),
            Some((start, end)) if start <= end => {
                self.range = Some((start.min(index), end.max(index)));
            }
            Some((start, end)) => {
                if self.contains(index) {
                    return;
                }
                // index lies in the gap (end, start); widen the nearer side.
                if index - end <= start - index {
                    self.range = Some((start, index));
                } else {
                    self.range = Some((index, end));
                }
            }
        }
    }

    /// Recomputes the window from the sorted indices of the surviving live
    /// children. With `is_loop`, the first gap > 1 is taken as the wrap
    /// boundary; otherwise the window is simply min/max.
    pub fn recompute<I>(&mut self, sorted: I, is_loop: bool)
    where
        I: IntoIterator<Item = usize>,
    {
        let indices: SmallVec<[usize; 16]> = sorted.into_iter().collect();
        let (Some(&first), Some(&last)) = (indices.first(), indices.last()) else {
            self.range = None;
            return;
        };
        if is_loop {
            for pair in indices.windows(2) {
                if pair[1] - pair[0] > 1 {
                    self.range = Some((pair[1], pair[0]));
                    return;
                }
            }
        }
        self.range = Some((first, last));
    }

    /// Enumerates the prebuild candidates around the window: up to
    /// `cached_count` steps ahead of the end and behind the start, wrapping
    /// when `is_loop`, clamped to `0..total`, skipping indices the caller
    /// reports as already materialized.
    pub fn idle_indices<P>(
        &self,
        cached_count: usize,
        total: usize,
        is_loop: bool,
        mut is_materialized: P,
    ) -> IdleIndexes
    where
        P: FnMut(usize) -> bool,
    {
        let mut out = IdleIndexes::new();
        let Some((start, end)) = self.range else {
            return out;
        };
        if total == 0 {
            return out;
        }
        let mut push = |index: usize, out: &mut IdleIndexes| {
            if !out.contains(&index) && !is_materialized(index) {
                out.push(index);
            }
        };
        for step in 1..=cached_count {
            if is_loop {
                push((end + step) % total, &mut out);
                push((start + total - step % total) % total, &mut out);
            } else {
                let ahead = end + step;
                if ahead < total {
                    push(ahead, &mut out);
                }
                if start >= step {
                    push(start - step, &mut out);
                }
            }
        }
        out
    }
}
