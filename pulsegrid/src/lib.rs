//! pulsegrid streams irregularly arriving microgrid component samples into
//! aligned, periodically emitted timeseries, and reconciles power requests
//! from multiple priority tiers into a single target power.
//!
//! Overview
//! - Resampling: each `Source` (typically a component data stream from the
//!   RPC client) is wrapped in a `StreamBinder`, which buffers samples in a
//!   `pulsegrid_core::RingBuffer` and emits one aggregated sample per
//!   `AlignedTimer` tick via its `Sink`.
//! - Scheduling: a `Resampler` owns the timer and the set of binders,
//!   invoking every binder in parallel on each tick; a failing binder's
//!   error is isolated and reported without aborting the others.
//! - Power arbitration: `Matryoshka` keeps a per-battery-set ledger of
//!   priority-ranked proposals and computes a single target power that
//!   respects every still-live tier's bounds, narrowing but never widening
//!   as priority decreases.
//! - RPC facade: `MicrogridApiClient` abstracts the wire transport; this
//!   crate ships no concrete gRPC client, only the trait, the shared
//!   per-component fan-out/backoff plumbing, and (in `pulsegrid-mock`) an
//!   in-process test double.
//!
//! Key behaviors and trade-offs
//! - Per-source period inference adapts each `RingBuffer`'s capacity once,
//!   at the moment a source's sampling period becomes knowable; this trades
//!   one early resize for avoiding a buffer sized for the wrong cadence for
//!   the source's whole lifetime.
//! - The per-component RPC fan-out blocks a slow subscriber instead of
//!   dropping samples for it (unlike `tokio::sync::broadcast`), at the cost
//!   of a slow subscriber being able to stall its own component's producer;
//!   other components' streams are unaffected.
//! - Matryoshka's `clamped` dominance rule means a higher-priority tier that
//!   conflicts with an established target "wins" the target exactly once;
//!   every lower-priority tier after that can still narrow the bounds but
//!   never re-contests the target for that pass.
#![warn(missing_docs)]

/// Priority-tier power arbitration.
pub mod matryoshka;
/// Microgrid RPC client facade: trait, fan-out, backoff.
pub mod rpc;
/// Owns the aligned timer and the resampling pass.
pub mod scheduler;
/// Couples a `Source`/`Sink` pair to a `ResamplerCore`.
pub mod stream_binder;

pub use matryoshka::{Matryoshka, PowerMetrics, Proposal, Report};
pub use rpc::{
    Component, ComponentCategory, ComponentFanout, ComponentId, ComponentMeasurement, Connection,
    ExponentialBackoff, MicrogridApiClient,
};
pub use scheduler::Resampler;
pub use stream_binder::{Sink, Source, StreamBinder};

pub use pulsegrid_core::{
    AlignedTimer, Bounds, PulsegridError, ReductionFn, ResamplerConfig, ResamplerConfigBuilder,
    ResamplerCore, Sample, SourceProperties, SourceTracker, Tick, mean_reduction,
};
