//! Bounded, timestamp-ordered sample history with bisection-based window
//! selection.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::sample::Sample;

/// A fixed-capacity FIFO of [`Sample`]s, ordered non-decreasing by timestamp.
///
/// Pushing past capacity evicts the oldest sample. Callers are responsible
/// for pushing timestamps in non-decreasing order; the buffer does not
/// re-sort on insert (this mirrors the source contract in `SPEC_FULL.md`
/// §3: "timestamps are monotonically non-decreasing within a single source
/// stream").
#[derive(Debug, Clone)]
pub struct RingBuffer {
    maxlen: usize,
    buf: VecDeque<Sample>,
}

impl RingBuffer {
    /// Create an empty buffer with the given capacity.
    ///
    /// # Panics
    /// Panics if `maxlen` is zero.
    #[must_use]
    pub fn new(maxlen: usize) -> Self {
        assert!(maxlen > 0, "RingBuffer: maxlen must be > 0");
        Self {
            maxlen,
            buf: VecDeque::with_capacity(maxlen),
        }
    }

    /// Current number of stored samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// `true` if no samples are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Configured capacity.
    #[must_use]
    pub const fn maxlen(&self) -> usize {
        self.maxlen
    }

    /// `true` if the buffer holds `maxlen` samples.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.maxlen
    }

    /// Append a sample, evicting the oldest if the buffer is already full. O(1).
    pub fn push(&mut self, sample: Sample) {
        if self.buf.len() >= self.maxlen {
            self.buf.pop_front();
        }
        self.buf.push_back(sample);
    }

    /// Right-bisect: the first index `i` such that `buffer[i].timestamp > t`.
    ///
    /// Equivalent to `buf.len()` if every stored timestamp is `<= t`.
    #[must_use]
    pub fn bisect_by_timestamp(&self, t: DateTime<Utc>) -> usize {
        self.buf.partition_point(|s| s.timestamp <= t)
    }

    /// Materialize a read-only view of samples in `[i, j)`.
    #[must_use]
    pub fn slice(&self, i: usize, j: usize) -> Vec<Sample> {
        if i >= j {
            return Vec::new();
        }
        self.buf.iter().skip(i).take(j - i).copied().collect()
    }

    /// Rebuild with a new capacity, preserving the newest `min(len, new_maxlen)` samples.
    ///
    /// # Panics
    /// Panics if `new_maxlen` is zero.
    pub fn rebuild(&mut self, new_maxlen: usize) {
        assert!(new_maxlen > 0, "RingBuffer: new_maxlen must be > 0");
        let keep = self.buf.len().min(new_maxlen);
        let drop_count = self.buf.len() - keep;
        let mut new_buf = VecDeque::with_capacity(new_maxlen);
        new_buf.extend(self.buf.iter().skip(drop_count).copied());
        self.maxlen = new_maxlen;
        self.buf = new_buf;
    }
}
