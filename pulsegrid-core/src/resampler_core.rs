//! Resampling window selection and reduction, plus the immutable
//! `ResamplerConfig` that parameterizes it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::PulsegridError;
use crate::sample::Sample;
use crate::source_tracker::{SourceProperties, SourceTracker};

/// A pluggable aggregation function over the samples in a relevance window.
///
/// Receives the relevant samples (already windowed), the config, and the
/// source's observed properties; returns the aggregated value, or `None` if
/// the function declines to produce one (distinct from an empty window,
/// which `ResamplerCore` handles itself before calling this).
pub type ReductionFn =
    Arc<dyn Fn(&[Sample], &ResamplerConfig, &SourceProperties) -> Option<f64> + Send + Sync>;

/// Arithmetic mean of `base_value` (here, `Sample::value`) over samples
/// whose value is present. The default reduction function.
#[must_use]
pub fn mean_reduction(
    samples: &[Sample],
    _config: &ResamplerConfig,
    _props: &SourceProperties,
) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for s in samples {
        if let Some(v) = s.value
            && !v.is_nan()
        {
            sum += v;
            count += 1;
        }
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Immutable configuration for a resampler, validated at construction.
#[derive(Clone)]
pub struct ResamplerConfig {
    /// Output cadence; must be `> 0`.
    pub resampling_period: Duration,
    /// Relevance horizon multiplier; must be `>= 1.0`.
    pub max_data_age_in_periods: f64,
    /// Reduction function applied to each relevance window.
    pub reduction_fn: ReductionFn,
    /// Initial ring buffer capacity per source; must be `>= 1`.
    pub initial_buffer_len: usize,
    /// Buffer length above which a resize logs a warning; must be `>= 1`.
    pub warn_buffer_len: usize,
    /// Maximum buffer length; must be `> warn_buffer_len`.
    pub max_buffer_len: usize,
    /// Anchor instant for output timestamps; `None` uses construction time.
    pub align_to: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for ResamplerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResamplerConfig")
            .field("resampling_period", &self.resampling_period)
            .field("max_data_age_in_periods", &self.max_data_age_in_periods)
            .field("initial_buffer_len", &self.initial_buffer_len)
            .field("warn_buffer_len", &self.warn_buffer_len)
            .field("max_buffer_len", &self.max_buffer_len)
            .field("align_to", &self.align_to)
            .finish_non_exhaustive()
    }
}

impl ResamplerConfig {
    /// Start building a config with the given resampling period and defaults
    /// for everything else (mean reduction, buffer lens 16/1024/4096,
    /// `max_data_age_in_periods = 3.0`, no alignment anchor).
    #[must_use]
    pub fn builder(resampling_period: Duration) -> ResamplerConfigBuilder {
        ResamplerConfigBuilder {
            resampling_period,
            max_data_age_in_periods: 3.0,
            reduction_fn: Arc::new(mean_reduction),
            initial_buffer_len: 16,
            warn_buffer_len: 1024,
            max_buffer_len: 4096,
            align_to: None,
        }
    }
}

/// Builder for [`ResamplerConfig`]; validation happens in [`build`](Self::build).
pub struct ResamplerConfigBuilder {
    resampling_period: Duration,
    max_data_age_in_periods: f64,
    reduction_fn: ReductionFn,
    initial_buffer_len: usize,
    warn_buffer_len: usize,
    max_buffer_len: usize,
    align_to: Option<DateTime<Utc>>,
}

impl ResamplerConfigBuilder {
    /// Override `max_data_age_in_periods`.
    #[must_use]
    pub const fn max_data_age_in_periods(mut self, v: f64) -> Self {
        self.max_data_age_in_periods = v;
        self
    }

    /// Override the reduction function.
    #[must_use]
    pub fn reduction_fn(mut self, f: ReductionFn) -> Self {
        self.reduction_fn = f;
        self
    }

    /// Override `initial_buffer_len`.
    #[must_use]
    pub const fn initial_buffer_len(mut self, v: usize) -> Self {
        self.initial_buffer_len = v;
        self
    }

    /// Override `warn_buffer_len`.
    #[must_use]
    pub const fn warn_buffer_len(mut self, v: usize) -> Self {
        self.warn_buffer_len = v;
        self
    }

    /// Override `max_buffer_len`.
    #[must_use]
    pub const fn max_buffer_len(mut self, v: usize) -> Self {
        self.max_buffer_len = v;
        self
    }

    /// Set the alignment anchor for output timestamps.
    #[must_use]
    pub const fn align_to(mut self, at: DateTime<Utc>) -> Self {
        self.align_to = Some(at);
        self
    }

    /// Validate and build the config.
    ///
    /// # Errors
    /// Returns `PulsegridError::Config` if any invariant from `SPEC_FULL.md`
    /// §3 is violated.
    pub fn build(self) -> Result<ResamplerConfig, PulsegridError> {
        if self.resampling_period.is_zero() {
            return Err(PulsegridError::Config(
                "resampling_period must be > 0".into(),
            ));
        }
        if self.max_data_age_in_periods < 1.0 {
            return Err(PulsegridError::Config(
                "max_data_age_in_periods must be >= 1.0".into(),
            ));
        }
        if self.initial_buffer_len == 0 {
            return Err(PulsegridError::Config(
                "initial_buffer_len must be >= 1".into(),
            ));
        }
        if self.warn_buffer_len == 0 {
            return Err(PulsegridError::Config("warn_buffer_len must be >= 1".into()));
        }
        if self.max_buffer_len <= self.warn_buffer_len {
            return Err(PulsegridError::Config(
                "max_buffer_len must be > warn_buffer_len".into(),
            ));
        }
        if self.initial_buffer_len > self.max_buffer_len {
            return Err(PulsegridError::Config(
                "initial_buffer_len must be <= max_buffer_len".into(),
            ));
        }
        Ok(ResamplerConfig {
            resampling_period: self.resampling_period,
            max_data_age_in_periods: self.max_data_age_in_periods,
            reduction_fn: self.reduction_fn,
            initial_buffer_len: self.initial_buffer_len,
            warn_buffer_len: self.warn_buffer_len,
            max_buffer_len: self.max_buffer_len,
            align_to: self.align_to,
        })
    }
}

/// Given a tracker and a window-end timestamp, selects the relevant samples
/// and invokes the configured reduction function.
#[derive(Debug)]
pub struct ResamplerCore {
    tracker: SourceTracker,
}

impl ResamplerCore {
    /// Wrap a freshly created tracker.
    #[must_use]
    pub const fn new(tracker: SourceTracker) -> Self {
        Self { tracker }
    }

    /// Feed a sample to the underlying tracker (delegates NaN/absent filtering).
    pub fn add_sample(&mut self, sample: Sample) {
        self.tracker.add_sample(sample);
    }

    /// Observed properties of the underlying source.
    #[must_use]
    pub const fn properties(&self) -> &SourceProperties {
        self.tracker.properties()
    }

    /// Run one resampling pass per `SPEC_FULL.md` §4.3.
    #[must_use]
    pub fn resample(&mut self, config: &ResamplerConfig, window_end: DateTime<Utc>) -> Sample {
        if self.tracker.maybe_update_period(config, window_end) {
            self.tracker.maybe_resize_buffer(config);
        }

        let period = self
            .tracker
            .properties()
            .sampling_period
            .map_or(config.resampling_period, |sp| sp.max(config.resampling_period));

        let window_secs = period.as_secs_f64() * config.max_data_age_in_periods;
        #[allow(clippy::cast_possible_truncation)]
        let window_delta = chrono::Duration::milliseconds((window_secs * 1000.0).round() as i64);
        let min_ts = window_end - window_delta;

        let buffer = self.tracker.buffer();
        let min_index = buffer.bisect_by_timestamp(min_ts);
        let max_index = buffer.bisect_by_timestamp(window_end);
        let relevant = buffer.slice(min_index, max_index);

        if relevant.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::warn!(%window_end, "empty relevance window");
            return Sample::empty(window_end);
        }

        match (config.reduction_fn)(&relevant, config, self.tracker.properties()) {
            Some(v) => Sample::new(window_end, v),
            None => Sample::empty(window_end),
        }
    }
}
