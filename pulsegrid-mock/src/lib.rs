//! In-process mock [`MicrogridApiClient`] backed by static fixtures, with
//! magic component ids for fault injection — sufficient to drive the
//! resampler and Matryoshka pipelines in tests without a real gRPC server.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pulsegrid::rpc::{
    Component, ComponentCategory, ComponentFanout, ComponentId, ComponentMeasurement, Connection,
    ExponentialBackoff, MicrogridApiClient, validate_bounds,
};
use pulsegrid_core::error::PulsegridError;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

/// Component id that always fails its streaming task once per connection
/// attempt before recovering, exercising the reconnect/backoff policy.
pub const FAULT_RETRY_ID: ComponentId = 9001;
/// Component id that fails every streaming attempt, exhausting the retry
/// budget and closing the stream.
pub const FAULT_EXHAUST_ID: ComponentId = 9002;
/// Component id that fails every unary call (`set_power`, `set_bounds`,
/// `components`, `connections`).
pub const FAULT_UNARY_ID: ComponentId = 9003;

struct StreamState {
    fanout: Arc<ComponentFanout>,
    task: JoinHandle<()>,
}

/// Deterministic mock transport. Holds a fixed component/connection
/// fixture and lazily spawns one streaming task per subscribed component.
pub struct MockMicrogridClient {
    components: Vec<Component>,
    connections: Vec<Connection>,
    period: Duration,
    streams: Mutex<HashMap<ComponentId, StreamState>>,
}

impl MockMicrogridClient {
    /// Build a mock client from fixture `components`/`connections`,
    /// streaming a synthetic measurement every `period`.
    #[must_use]
    pub fn new(components: Vec<Component>, connections: Vec<Connection>, period: Duration) -> Self {
        Self {
            components,
            connections,
            period,
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// A small fixture: one meter, one battery, one inverter, one EV
    /// charger, streaming every `period`.
    #[must_use]
    pub fn with_default_fixture(period: Duration) -> Self {
        let components = vec![
            Component {
                id: 1,
                category: ComponentCategory::Meter,
                metadata: Some("grid meter".into()),
            },
            Component {
                id: 2,
                category: ComponentCategory::Battery,
                metadata: Some("battery pack A".into()),
            },
            Component {
                id: 3,
                category: ComponentCategory::Inverter,
                metadata: Some("inverter A".into()),
            },
            Component {
                id: 4,
                category: ComponentCategory::EvCharger,
                metadata: Some("charger A".into()),
            },
        ];
        let connections = vec![
            Connection { start: 0, end: 1 },
            Connection { start: 1, end: 2 },
            Connection { start: 2, end: 3 },
            Connection { start: 1, end: 4 },
        ];
        Self::new(components, connections, period)
    }

    fn expect_category(
        &self,
        component_id: ComponentId,
        expected: ComponentCategory,
    ) -> Result<(), PulsegridError> {
        let comp = self
            .components
            .iter()
            .find(|c| c.id == component_id)
            .ok_or_else(|| {
                PulsegridError::invalid_component(component_id, "unknown component id")
            })?;
        if comp.category != expected {
            return Err(PulsegridError::invalid_component(
                component_id,
                format!("expected {expected:?}, found {:?}", comp.category),
            ));
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        component_id: ComponentId,
        maxsize: usize,
    ) -> mpsc::Receiver<ComponentMeasurement> {
        let mut streams = self.streams.lock().await;
        let state = streams.entry(component_id).or_insert_with(|| {
            let fanout = Arc::new(ComponentFanout::new());
            let task = spawn_stream_task(component_id, self.period, Arc::clone(&fanout));
            StreamState { fanout, task }
        });
        state.fanout.subscribe(maxsize).await
    }
}

fn spawn_stream_task(
    component_id: ComponentId,
    period: Duration,
    fanout: Arc<ComponentFanout>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = ExponentialBackoff::new(Duration::from_millis(10), Duration::from_secs(1), Some(3));
        let mut remaining_forced_failures = match component_id {
            FAULT_RETRY_ID => 1,
            FAULT_EXHAUST_ID => u32::MAX,
            _ => 0,
        };

        loop {
            if remaining_forced_failures > 0 {
                remaining_forced_failures -= 1;
                #[cfg(feature = "tracing")]
                tracing::warn!(component_id, "mock stream transport failure injected");
                match backoff.next_interval() {
                    Some(delay) => {
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    None => {
                        #[cfg(feature = "tracing")]
                        tracing::error!(component_id, "mock stream retry budget exhausted");
                        fanout.close().await;
                        return;
                    }
                }
            }
            backoff.reset();

            let measurement = ComponentMeasurement {
                component_id,
                timestamp: Utc::now(),
                active_power_w: Some(synthetic_power(component_id)),
            };
            fanout.publish(measurement).await;
            tokio::time::sleep(period).await;

            if fanout.is_idle().await {
                return;
            }
        }
    })
}

fn synthetic_power(component_id: ComponentId) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let base = (component_id % 100) as f64;
    base * 10.0
}

#[async_trait]
impl MicrogridApiClient for MockMicrogridClient {
    async fn components(&self) -> Result<Vec<Component>, PulsegridError> {
        Ok(self
            .components
            .iter()
            .filter(|c| c.category != ComponentCategory::Sensor)
            .cloned()
            .collect())
    }

    async fn connections(
        &self,
        starts: Option<HashSet<ComponentId>>,
        ends: Option<HashSet<ComponentId>>,
    ) -> Result<Vec<Connection>, PulsegridError> {
        Ok(self
            .connections
            .iter()
            .filter(|c| starts.as_ref().is_none_or(|s| s.is_empty() || s.contains(&c.start)))
            .filter(|c| ends.as_ref().is_none_or(|e| e.is_empty() || e.contains(&c.end)))
            .copied()
            .collect())
    }

    async fn meter_data(
        &self,
        component_id: ComponentId,
        maxsize: usize,
    ) -> Result<mpsc::Receiver<pulsegrid::rpc::MeterData>, PulsegridError> {
        self.expect_category(component_id, ComponentCategory::Meter)?;
        Ok(self.subscribe(component_id, maxsize).await)
    }

    async fn battery_data(
        &self,
        component_id: ComponentId,
        maxsize: usize,
    ) -> Result<mpsc::Receiver<pulsegrid::rpc::BatteryData>, PulsegridError> {
        self.expect_category(component_id, ComponentCategory::Battery)?;
        Ok(self.subscribe(component_id, maxsize).await)
    }

    async fn inverter_data(
        &self,
        component_id: ComponentId,
        maxsize: usize,
    ) -> Result<mpsc::Receiver<pulsegrid::rpc::InverterData>, PulsegridError> {
        self.expect_category(component_id, ComponentCategory::Inverter)?;
        Ok(self.subscribe(component_id, maxsize).await)
    }

    async fn ev_charger_data(
        &self,
        component_id: ComponentId,
        maxsize: usize,
    ) -> Result<mpsc::Receiver<pulsegrid::rpc::EvChargerData>, PulsegridError> {
        self.expect_category(component_id, ComponentCategory::EvCharger)?;
        Ok(self.subscribe(component_id, maxsize).await)
    }

    async fn set_power(&self, component_id: ComponentId, power_w: f64) -> Result<(), PulsegridError> {
        if component_id == FAULT_UNARY_ID {
            return Err(PulsegridError::rpc("mock", "forced set_power failure"));
        }
        let _ = power_w;
        Ok(())
    }

    async fn set_bounds(
        &self,
        component_id: ComponentId,
        lower: f64,
        upper: f64,
    ) -> Result<(), PulsegridError> {
        validate_bounds(lower, upper)?;
        if component_id == FAULT_UNARY_ID {
            return Err(PulsegridError::rpc("mock", "forced set_bounds failure"));
        }
        Ok(())
    }
}

impl Drop for MockMicrogridClient {
    fn drop(&mut self) {
        if let Ok(mut streams) = self.streams.try_lock() {
            for (_, state) in streams.drain() {
                state.task.abort();
            }
        }
    }
}
