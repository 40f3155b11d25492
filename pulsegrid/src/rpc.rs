//! Microgrid RPC client facade: component/connection listing, per-component
//! streaming with a reconnect policy, and unary power/bounds calls.
//!
//! The wire transport is abstracted behind [`MicrogridApiClient`]; this
//! crate ships no concrete gRPC transport, only the trait, the shared
//! fan-out/backoff plumbing a transport needs, and (in `pulsegrid-mock`) an
//! in-process test double.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulsegrid_core::error::PulsegridError;
use tokio::sync::mpsc;

/// Numeric identity of a microgrid component.
pub type ComponentId = u64;

/// The implicit grid node id used in [`Connection`]s that terminate outside
/// any listed component.
pub const GRID_NODE_ID: ComponentId = 0;

/// Default timeout applied to unary RPC calls (`components`, `connections`,
/// `set_power`, `set_bounds`).
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// The kind of a microgrid component. `Sensor` components are filtered out
/// of [`MicrogridApiClient::components`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentCategory {
    /// Power meter.
    Meter,
    /// Inverter.
    Inverter,
    /// Battery.
    Battery,
    /// EV charger.
    EvCharger,
    /// The implicit grid connection point.
    Grid,
    /// A sensor; filtered out of component listings.
    Sensor,
    /// Any category this crate does not otherwise distinguish.
    Other,
}

/// A component present in the microgrid.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Unique component id.
    pub id: ComponentId,
    /// Component kind.
    pub category: ComponentCategory,
    /// Free-form descriptive metadata (model, location, ...).
    pub metadata: Option<String>,
}

/// A directed edge between two components (or the implicit grid node).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    /// Upstream component id, or [`GRID_NODE_ID`].
    pub start: ComponentId,
    /// Downstream component id, or [`GRID_NODE_ID`].
    pub end: ComponentId,
}

/// One streamed data row from a component. Meter, battery, inverter, and EV
/// charger streams all carry this shape; the distinct `*Data` aliases below
/// exist so call sites read by the category they stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentMeasurement {
    /// The component this row was read from.
    pub component_id: ComponentId,
    /// When the measurement was taken.
    pub timestamp: DateTime<Utc>,
    /// Active power, in watts. Positive is charging/consuming.
    pub active_power_w: Option<f64>,
}

/// Data row streamed from a meter.
pub type MeterData = ComponentMeasurement;
/// Data row streamed from a battery.
pub type BatteryData = ComponentMeasurement;
/// Data row streamed from an inverter.
pub type InverterData = ComponentMeasurement;
/// Data row streamed from an EV charger.
pub type EvChargerData = ComponentMeasurement;

/// Validate `set_bounds` arguments before any RPC is attempted: the
/// inclusion interval must straddle zero.
///
/// # Errors
/// Returns `PulsegridError::InvalidArg` if `upper < 0` or `lower > 0`.
pub fn validate_bounds(lower: f64, upper: f64) -> Result<(), PulsegridError> {
    if upper < 0.0 {
        return Err(PulsegridError::InvalidArg(format!(
            "upper bound {upper} must be >= 0"
        )));
    }
    if lower > 0.0 {
        return Err(PulsegridError::InvalidArg(format!(
            "lower bound {lower} must be <= 0"
        )));
    }
    Ok(())
}

/// Base interface for microgrid API transports.
///
/// Implementations own one streaming task and one fan-out registry per
/// `component_id`, created lazily on first subscription (see
/// [`ComponentFanout`]).
#[async_trait]
pub trait MicrogridApiClient: Send + Sync {
    /// List all non-sensor components present in the microgrid.
    async fn components(&self) -> Result<Vec<Component>, PulsegridError>;

    /// List connections between components, optionally filtered by
    /// endpoint id. Both endpoints of a returned connection are known
    /// component ids or [`GRID_NODE_ID`].
    async fn connections(
        &self,
        starts: Option<HashSet<ComponentId>>,
        ends: Option<HashSet<ComponentId>>,
    ) -> Result<Vec<Connection>, PulsegridError>;

    /// Subscribe to a meter's data stream.
    async fn meter_data(
        &self,
        component_id: ComponentId,
        maxsize: usize,
    ) -> Result<mpsc::Receiver<MeterData>, PulsegridError>;

    /// Subscribe to a battery's data stream.
    async fn battery_data(
        &self,
        component_id: ComponentId,
        maxsize: usize,
    ) -> Result<mpsc::Receiver<BatteryData>, PulsegridError>;

    /// Subscribe to an inverter's data stream.
    async fn inverter_data(
        &self,
        component_id: ComponentId,
        maxsize: usize,
    ) -> Result<mpsc::Receiver<InverterData>, PulsegridError>;

    /// Subscribe to an EV charger's data stream.
    async fn ev_charger_data(
        &self,
        component_id: ComponentId,
        maxsize: usize,
    ) -> Result<mpsc::Receiver<EvChargerData>, PulsegridError>;

    /// Request a component charge (positive) or discharge (negative) at
    /// `power_w`; `0` stops charging/discharging.
    async fn set_power(&self, component_id: ComponentId, power_w: f64) -> Result<(), PulsegridError>;

    /// Set the inclusion power bounds for a component.
    ///
    /// # Errors
    /// Returns `PulsegridError::InvalidArg` if `lower > 0` or `upper < 0`
    /// (checked client-side, before any RPC is attempted).
    async fn set_bounds(
        &self,
        component_id: ComponentId,
        lower: f64,
        upper: f64,
    ) -> Result<(), PulsegridError>;
}

/// Stateful jittered-exponential backoff, queried once per failed attempt
/// until it returns `None` (budget exhausted).
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    max_attempts: Option<u32>,
    attempt: u32,
}

impl ExponentialBackoff {
    /// Construct a backoff starting at `base`, doubling each attempt up to
    /// `max`, giving up after `max_attempts` (`None` for unlimited).
    #[must_use]
    pub const fn new(base: Duration, max: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            base,
            max,
            max_attempts,
            attempt: 0,
        }
    }

    /// The number of attempts made (successful calls to `next_interval`) so far.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Reset the attempt counter, e.g. after a successful reconnect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Compute the next sleep interval, jittered by up to ±25%, or `None` if
    /// `max_attempts` has been reached.
    pub fn next_interval(&mut self) -> Option<Duration> {
        if let Some(max_attempts) = self.max_attempts
            && self.attempt >= max_attempts
        {
            return None;
        }
        let exp = 2u32.saturating_pow(self.attempt).min(1 << 16);
        let nominal = self.base.saturating_mul(exp).min(self.max);
        self.attempt += 1;

        let jitter_frac = rand::random::<f64>().mul_add(0.5, 0.75); // in [0.75, 1.25)
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let jittered_nanos = (nominal.as_nanos() as f64 * jitter_frac) as u64;
        Some(Duration::from_nanos(jittered_nanos))
    }
}

/// Shared per-component fan-out: one producer feeds `N` bounded `mpsc`
/// subscribers, `send().await` into each so a full subscriber queue blocks
/// the producer rather than dropping data for other subscribers.
#[derive(Default)]
pub struct ComponentFanout {
    subscribers: tokio::sync::Mutex<Vec<mpsc::Sender<ComponentMeasurement>>>,
}

impl ComponentFanout {
    /// Construct an empty fan-out with no subscribers yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new bounded subscriber and return its receiving half.
    pub async fn subscribe(&self, maxsize: usize) -> mpsc::Receiver<ComponentMeasurement> {
        let (tx, rx) = mpsc::channel(maxsize.max(1));
        self.subscribers.lock().await.push(tx);
        rx
    }

    /// Deliver one measurement to every live subscriber, awaiting each send
    /// in turn (blocking discipline, not drop-oldest) and pruning closed
    /// subscribers.
    pub async fn publish(&self, measurement: ComponentMeasurement) {
        let mut subs = self.subscribers.lock().await;
        let mut i = 0;
        while i < subs.len() {
            if subs[i].send(measurement).await.is_ok() {
                i += 1;
            } else {
                subs.swap_remove(i);
            }
        }
    }

    /// `true` if no subscriber has ever been registered or all have closed.
    pub async fn is_idle(&self) -> bool {
        self.subscribers.lock().await.is_empty()
    }

    /// Drop every subscriber sender, closing all outstanding receivers.
    /// Used when the producing task gives up permanently (e.g. a reconnect
    /// budget is exhausted) so subscribers observe closure rather than
    /// silence.
    pub async fn close(&self) {
        self.subscribers.lock().await.clear();
    }
}
