use std::collections::HashMap;

use thiserror::Error;

/// Unified error type for the pulsegrid workspace.
///
/// Covers the resampler's per-source failure modes, the scheduler's
/// aggregate pass failures, RPC-facade failures, and config validation.
#[derive(Debug, Error)]
pub enum PulsegridError {
    /// The source stream ended cleanly but a `resample()` was attempted afterwards.
    #[error("source stopped: {source_id}")]
    SourceStopped {
        /// Identity of the source that stopped.
        source_id: String,
    },

    /// The source stream raised; captured once and re-raised on every subsequent `resample()`.
    #[error("source {source_id} failed: {msg}")]
    SourceError {
        /// Identity of the failing source.
        source_id: String,
        /// Captured failure message.
        msg: String,
    },

    /// The sink raised during one resampling pass; the binder keeps receiving.
    #[error("sink failed for {source_id}: {msg}")]
    SinkError {
        /// Identity of the source whose sink failed.
        source_id: String,
        /// Captured failure message.
        msg: String,
    },

    /// Aggregate error raised by the scheduler after a pass with one or more failing binders.
    #[error("resampling failed for {} source(s)", .causes.len())]
    ResamplingError {
        /// Map of source identity to its underlying cause, rendered as text.
        causes: HashMap<String, String>,
    },

    /// A requested `component_id` is unknown or of an unexpected category.
    #[error("invalid component {component_id}: {msg}")]
    InvalidComponent {
        /// The component id that failed validation.
        component_id: u64,
        /// Description of the mismatch.
        msg: String,
    },

    /// A `ResamplerConfig` invariant was violated at construction.
    #[error("invalid config: {0}")]
    Config(String),

    /// A unary RPC call failed; wraps the target address in the message.
    #[error("rpc call to {target} failed: {msg}")]
    Rpc {
        /// The microgrid API target address.
        target: String,
        /// Underlying failure message.
        msg: String,
    },

    /// Invalid argument to a programmatic API call not covered by a more specific variant.
    #[error("invalid argument: {0}")]
    InvalidArg(String),
}

impl PulsegridError {
    /// Build a `SourceStopped` error for the given source identity.
    pub fn source_stopped(source_id: impl Into<String>) -> Self {
        Self::SourceStopped {
            source_id: source_id.into(),
        }
    }

    /// Build a `SourceError` error for the given source identity and cause.
    pub fn source_error(source_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SourceError {
            source_id: source_id.into(),
            msg: msg.into(),
        }
    }

    /// Build a `SinkError` error for the given source identity and cause.
    pub fn sink_error(source_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SinkError {
            source_id: source_id.into(),
            msg: msg.into(),
        }
    }

    /// Build an `InvalidComponent` error.
    pub fn invalid_component(component_id: u64, msg: impl Into<String>) -> Self {
        Self::InvalidComponent {
            component_id,
            msg: msg.into(),
        }
    }

    /// Build a `Rpc` error, wrapping the target address.
    pub fn rpc(target: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Rpc {
            target: target.into(),
            msg: msg.into(),
        }
    }

    /// Render every cause in a `ResamplingError` as `"source: cause"` lines, stably sorted.
    #[must_use]
    pub fn resampling_causes(&self) -> Vec<String> {
        match self {
            Self::ResamplingError { causes } => {
                let mut lines: Vec<String> = causes
                    .iter()
                    .map(|(source, cause)| format!("{source}: {cause}"))
                    .collect();
                lines.sort();
                lines
            }
            _ => Vec::new(),
        }
    }
}
