//! Owns the aligned timer, the set of stream binders, and the resampling
//! pass itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use pulsegrid_core::aligned_timer::AlignedTimer;
use pulsegrid_core::error::PulsegridError;
use pulsegrid_core::resampler_core::{ResamplerConfig, ResamplerCore};
use pulsegrid_core::source_tracker::{SourceProperties, SourceTracker};
use tokio::sync::{Mutex, Notify, mpsc};

use crate::stream_binder::{Sink, Source, StreamBinder};

struct SchedulerState {
    timer: AlignedTimer,
    window_end: DateTime<Utc>,
    binders: HashMap<String, StreamBinder>,
}

/// Public resampler API: owns a set of named timeseries and drives a single
/// aligned resampling loop over them.
///
/// Cloning a `Resampler` is cheap (it shares the same underlying state via
/// `Arc`) and is how `add_timeseries`/`remove_timeseries`/`stop` are called
/// from a different task than the one driving [`resample`](Self::resample).
#[derive(Clone)]
pub struct Resampler {
    config: ResamplerConfig,
    state: Arc<Mutex<SchedulerState>>,
    cancel: Arc<Notify>,
    stopped: Arc<AtomicBool>,
    errors: mpsc::UnboundedSender<PulsegridError>,
}

impl Resampler {
    /// Construct a resampler with no timeseries registered yet, and the
    /// receiving half of its per-pass error channel.
    ///
    /// In continuous mode, [`resample`](Self::resample) pushes every pass's
    /// `ResamplingError` onto this channel so failures stay observable even
    /// with the `tracing` feature disabled; dropping the receiver is fine,
    /// the sends are best-effort.
    ///
    /// # Errors
    /// Propagates construction-time config validation errors if `config`
    /// was built without going through `ResamplerConfig::builder(..).build()`.
    pub fn new(config: ResamplerConfig) -> (Self, mpsc::UnboundedReceiver<PulsegridError>) {
        let now_wall = Utc::now();
        let now_mono = tokio::time::Instant::now();
        let timer = AlignedTimer::new(config.resampling_period, config.align_to, now_wall, now_mono);
        let window_end = timer.next_scheduled();
        let (errors, error_rx) = mpsc::unbounded_channel();

        let resampler = Self {
            config,
            state: Arc::new(Mutex::new(SchedulerState {
                timer,
                window_end,
                binders: HashMap::new(),
            })),
            cancel: Arc::new(Notify::new()),
            stopped: Arc::new(AtomicBool::new(false)),
            errors,
        };
        (resampler, error_rx)
    }

    /// Insert a new timeseries. Returns `false` if `name` is already registered.
    pub async fn add_timeseries(
        &self,
        name: impl Into<String>,
        source: Box<dyn Source>,
        sink: Box<dyn Sink>,
    ) -> bool {
        let name = name.into();
        let mut state = self.state.lock().await;
        if state.binders.contains_key(&name) {
            return false;
        }
        let core = ResamplerCore::new(SourceTracker::new(self.config.initial_buffer_len));
        let binder = StreamBinder::new(name.clone(), source, sink, core);
        state.binders.insert(name, binder);
        true
    }

    /// Remove a timeseries by name, returning the removed binder so the
    /// caller controls its shutdown (per `SPEC_FULL.md` §4.6, removal does
    /// not implicitly stop the binder).
    pub async fn remove_timeseries(&self, name: &str) -> Option<StreamBinder> {
        let mut state = self.state.lock().await;
        state.binders.remove(name)
    }

    /// Snapshot of a registered source's observed properties.
    pub async fn get_source_properties(&self, name: &str) -> Option<SourceProperties> {
        let state = self.state.lock().await;
        if let Some(binder) = state.binders.get(name) {
            Some(binder.properties().await)
        } else {
            None
        }
    }

    /// Drive the resampling loop. If `one_shot`, returns after the first
    /// pass; otherwise loops until [`stop`](Self::stop) is called.
    ///
    /// # Errors
    /// In one-shot mode, returns `PulsegridError::ResamplingError` if any
    /// binder failed during the single pass. In continuous mode, per-pass
    /// failures are pushed onto the error channel returned by
    /// [`new`](Self::new) (the timer keeps running) and only a fatal
    /// internal condition would return `Err`.
    pub async fn resample(&self, one_shot: bool) -> Result<(), PulsegridError> {
        loop {
            if self.stopped.load(Ordering::Acquire) {
                return Ok(());
            }

            let tick = {
                let mut state = self.state.lock().await;
                tokio::select! {
                    biased;
                    () = self.cancel.notified() => return Ok(()),
                    t = state.timer.tick() => t,
                }
            };

            #[allow(clippy::cast_precision_loss)]
            let drift_ratio = tick.drift.num_milliseconds().unsigned_abs() as f64
                / (self.config.resampling_period.as_millis().max(1) as f64);
            if drift_ratio > 0.1 {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    drift_ms = tick.drift.num_milliseconds(),
                    "resampling tick drift exceeds 10% of resampling_period"
                );
            }

            let causes = self.run_one_pass().await;

            if !causes.is_empty() {
                let err = PulsegridError::ResamplingError { causes };
                if one_shot {
                    return Err(err);
                }
                #[cfg(feature = "tracing")]
                tracing::error!(?err, "resampling pass had per-source failures");
                let _ = self.errors.send(err);
            }

            if one_shot {
                return Ok(());
            }
        }
    }

    async fn run_one_pass(&self) -> HashMap<String, String> {
        let mut state = self.state.lock().await;
        let window_end = state.window_end;

        let mut futs: FuturesUnordered<_> = state
            .binders
            .iter()
            .map(|(name, binder)| {
                let name = name.clone();
                async move { (name, binder.resample(&self.config, window_end).await) }
            })
            .collect();

        let mut causes = HashMap::new();
        while let Some((name, res)) = futs.next().await {
            if let Err(e) = res {
                causes.insert(name, e.to_string());
            }
        }
        drop(futs);

        let period =
            chrono::Duration::from_std(self.config.resampling_period).unwrap_or_default();
        state.window_end = window_end + period;
        causes
    }

    /// Stop all registered binders concurrently and unblock any in-flight
    /// [`resample`](Self::resample) loop.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.cancel.notify_waiters();
        let binders: Vec<StreamBinder> = {
            let mut state = self.state.lock().await;
            state.binders.drain().map(|(_, b)| b).collect()
        };
        futures::future::join_all(binders.into_iter().map(StreamBinder::stop)).await;
    }
}
