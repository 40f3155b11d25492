//! Per-source statistics and adaptive buffer sizing.

use chrono::{DateTime, Utc};

use crate::resampler_core::ResamplerConfig;
use crate::ring_buffer::RingBuffer;
use crate::sample::Sample;

/// Observed statistics for one source stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceProperties {
    /// Timestamp of the first accepted sample.
    pub sampling_start: Option<DateTime<Utc>>,
    /// Count of accepted (non-dropped) samples.
    pub received_samples: u64,
    /// Empirically inferred mean inter-arrival time, set at most once.
    pub sampling_period: Option<std::time::Duration>,
}

/// Wraps a [`RingBuffer`] and [`SourceProperties`] for a single source,
/// implementing period inference and adaptive buffer resizing.
#[derive(Debug)]
pub struct SourceTracker {
    buffer: RingBuffer,
    props: SourceProperties,
}

impl SourceTracker {
    /// Create a tracker with the given initial buffer capacity.
    #[must_use]
    pub fn new(initial_buffer_len: usize) -> Self {
        Self {
            buffer: RingBuffer::new(initial_buffer_len),
            props: SourceProperties::default(),
        }
    }

    /// Read-only access to the underlying ring buffer.
    #[must_use]
    pub const fn buffer(&self) -> &RingBuffer {
        &self.buffer
    }

    /// Current observed properties.
    #[must_use]
    pub const fn properties(&self) -> &SourceProperties {
        &self.props
    }

    /// Reject samples whose value is absent or NaN; otherwise push to the
    /// buffer, recording `sampling_start` on first acceptance and
    /// incrementing `received_samples`.
    pub fn add_sample(&mut self, sample: Sample) {
        if !sample.is_numeric() {
            #[cfg(feature = "tracing")]
            tracing::trace!(timestamp = %sample.timestamp, "dropping sample with absent/NaN value");
            return;
        }
        if self.props.sampling_start.is_none() {
            self.props.sampling_start = Some(sample.timestamp);
        }
        self.props.received_samples += 1;
        self.buffer.push(sample);
    }

    /// Update `sampling_period` at most once, when all preconditions in
    /// `SPEC_FULL.md` §4.2 hold. Returns whether an update occurred.
    pub fn maybe_update_period(&mut self, config: &ResamplerConfig, now: DateTime<Utc>) -> bool {
        if self.props.sampling_period.is_some() {
            return false;
        }
        let Some(start) = self.props.sampling_start else {
            return false;
        };
        if now <= start {
            return false;
        }
        let min_samples =
            config.resampling_period.as_secs_f64() * config.max_data_age_in_periods;
        if (self.props.received_samples as f64) < min_samples {
            return false;
        }
        if !self.buffer.is_full() {
            return false;
        }

        let elapsed = (now - start)
            .to_std()
            .expect("now > start checked above");
        let period_secs = elapsed.as_secs_f64() / self.props.received_samples as f64;
        self.props.sampling_period = Some(std::time::Duration::from_secs_f64(period_secs));
        #[cfg(feature = "tracing")]
        tracing::debug!(period_secs, "inferred source sampling period");
        true
    }

    /// Resize the buffer per `SPEC_FULL.md` §4.2. Must be called only when
    /// `maybe_update_period` just returned `true`.
    pub fn maybe_resize_buffer(&mut self, config: &ResamplerConfig) {
        let Some(input_period) = self.props.sampling_period else {
            return;
        };
        let resampling_secs = config.resampling_period.as_secs_f64();
        let input_secs = input_period.as_secs_f64();

        let raw_len = if input_secs > resampling_secs {
            input_secs * config.max_data_age_in_periods
        } else {
            (resampling_secs / input_secs) * config.max_data_age_in_periods
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let mut new_len = raw_len.ceil() as usize;
        new_len = new_len.max(1);

        if new_len >= config.max_buffer_len {
            new_len = config.max_buffer_len;
            #[cfg(feature = "tracing")]
            tracing::error!(new_len, max_buffer_len = config.max_buffer_len, "buffer size clamped to max_buffer_len");
        } else if new_len > config.warn_buffer_len {
            #[cfg(feature = "tracing")]
            tracing::warn!(new_len, warn_buffer_len = config.warn_buffer_len, "buffer size exceeds warn threshold");
        }

        if new_len != self.buffer.maxlen() {
            #[cfg(feature = "tracing")]
            tracing::debug!(old_len = self.buffer.maxlen(), new_len, "rebuilding source buffer");
            self.buffer.rebuild(new_len);
        }
    }
}
