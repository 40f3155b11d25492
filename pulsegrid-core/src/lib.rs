//! pulsegrid-core
//!
//! Core types, buffering, and error handling shared by the pulsegrid
//! resampling pipeline and its Matryoshka power-arbitration layer.
//!
//! - `sample`: `Sample` and `Bounds`, the value types threaded through both
//!   subsystems.
//! - `ring_buffer`: bounded, timestamp-ordered sample history.
//! - `source_tracker`: per-source period inference and adaptive buffer sizing.
//! - `resampler_core`: window selection, reduction, and `ResamplerConfig`.
//! - `aligned_timer`: wall-clock aligned tick scheduling.
//! - `stream`: task lifecycle (stop/abort/drop) shared by every long-lived
//!   background task in the workspace.
#![warn(missing_docs)]

/// Wall-clock aligned tick scheduling.
pub mod aligned_timer;
/// Unified error type for the pulsegrid workspace.
pub mod error;
/// Bounded, timestamp-ordered sample history.
pub mod ring_buffer;
/// Window selection and reduction over a source's ring buffer.
pub mod resampler_core;
/// Core value types: `Sample` and `Bounds`.
pub mod sample;
/// Per-source statistics and adaptive buffer resizing.
pub mod source_tracker;
/// Task lifecycle abstractions for long-lived streaming tasks.
pub mod stream;

pub use aligned_timer::{AlignedTimer, Tick};
pub use error::PulsegridError;
pub use resampler_core::{ReductionFn, ResamplerConfig, ResamplerConfigBuilder, ResamplerCore, mean_reduction};
pub use ring_buffer::RingBuffer;
pub use sample::{Bounds, Sample};
pub use source_tracker::{SourceProperties, SourceTracker};
pub use stream::StreamHandle;
