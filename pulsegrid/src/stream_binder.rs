//! Couples a `Source` and a `Sink` to a `ResamplerCore`, isolating
//! per-source failures from the rest of the scheduler.

use std::sync::Arc;

use async_trait::async_trait;
use pulsegrid_core::error::PulsegridError;
use pulsegrid_core::resampler_core::{ResamplerConfig, ResamplerCore};
use pulsegrid_core::sample::Sample;
use pulsegrid_core::stream::{Abortable, Stoppable, drop_impl};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

/// An asynchronous sequence of samples: yields `Sample`s until the source
/// ends cleanly (`None`) or raises (`Some(Err(..))`).
#[async_trait]
pub trait Source: Send {
    /// Produce the next sample, or `None` on clean end-of-stream.
    async fn next_sample(&mut self) -> Option<Result<Sample, PulsegridError>>;
}

/// An async callable invoked once per resampling pass with the computed output sample.
#[async_trait]
pub trait Sink: Send {
    /// Deliver one resampled output sample.
    async fn send(&mut self, sample: Sample) -> Result<(), PulsegridError>;
}

#[derive(Debug, Clone)]
enum Termination {
    Stopped,
    Error(String),
}

/// Owns a background receive task for one `Source`, and forwards
/// `resample()` calls to the underlying `ResamplerCore` plus the `Sink`.
pub struct StreamBinder {
    source_id: String,
    core: Arc<Mutex<ResamplerCore>>,
    sink: Mutex<Box<dyn Sink>>,
    receive_task: Option<JoinHandle<()>>,
    stop_tx: Option<oneshot::Sender<()>>,
    termination: Arc<Mutex<Option<Termination>>>,
}

impl StreamBinder {
    /// Spawn the receive task and wrap it with a core/sink pair.
    pub fn new(
        source_id: impl Into<String>,
        mut source: Box<dyn Source>,
        sink: Box<dyn Sink>,
        core: ResamplerCore,
    ) -> Self {
        let source_id = source_id.into();
        let core = Arc::new(Mutex::new(core));
        let termination: Arc<Mutex<Option<Termination>>> = Arc::new(Mutex::new(None));
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let core_task = Arc::clone(&core);
        let termination_task = Arc::clone(&termination);
        let receive_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => {
                        break;
                    }
                    item = source.next_sample() => {
                        match item {
                            Some(Ok(sample)) => {
                                core_task.lock().await.add_sample(sample);
                            }
                            Some(Err(e)) => {
                                *termination_task.lock().await = Some(Termination::Error(e.to_string()));
                                break;
                            }
                            None => {
                                *termination_task.lock().await = Some(Termination::Stopped);
                                break;
                            }
                        }
                    }
                }
            }
        });

        Self {
            source_id,
            core,
            sink: Mutex::new(sink),
            receive_task: Some(receive_task),
            stop_tx: Some(stop_tx),
            termination,
        }
    }

    /// Identity of the wrapped source, used as the error key in
    /// `ResamplingError` aggregation.
    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Snapshot of the underlying source's observed properties.
    pub async fn properties(&self) -> pulsegrid_core::source_tracker::SourceProperties {
        *self.core.lock().await.properties()
    }

    /// Run one resampling pass for this binder, per `SPEC_FULL.md` §4.5.
    pub async fn resample(
        &self,
        config: &ResamplerConfig,
        window_end: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), PulsegridError> {
        let finished = self
            .receive_task
            .as_ref()
            .is_none_or(tokio::task::JoinHandle::is_finished);

        if finished {
            return match self.termination.lock().await.clone() {
                Some(Termination::Error(msg)) => {
                    Err(PulsegridError::source_error(self.source_id.clone(), msg))
                }
                Some(Termination::Stopped) | None => {
                    Err(PulsegridError::source_stopped(self.source_id.clone()))
                }
            };
        }

        let sample = self.core.lock().await.resample(config, window_end);
        self.sink
            .lock()
            .await
            .send(sample)
            .await
            .map_err(|e| PulsegridError::sink_error(self.source_id.clone(), e.to_string()))
    }

    /// Gracefully stop the receive task and await its completion.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = Stoppable::send(tx);
        }
        if let Some(task) = self.receive_task.take() {
            let _ = task.await;
        }
    }

    /// Force-abort the receive task without waiting for completion.
    pub fn abort(mut self) {
        if let Some(mut task) = self.receive_task.take() {
            Abortable::abort(&mut task);
        }
    }
}

impl Drop for StreamBinder {
    fn drop(&mut self) {
        drop_impl(&mut self.receive_task, &mut self.stop_tx);
    }
}
