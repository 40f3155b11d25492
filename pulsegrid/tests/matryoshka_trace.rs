//! A single long-running scenario exercising `Matryoshka` against one
//! persistent battery-set ledger, moving through conflicting, narrowing, and
//! exclusion-zone cases in sequence. Each step's expectation mirrors the
//! upstream project's own reference trace for this algorithm.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use pulsegrid::{Bounds, Matryoshka, PowerMetrics, Proposal, Report};

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(0, 0).unwrap()
}

fn batteries() -> HashSet<u64> {
    [2, 5].into_iter().collect()
}

struct Scenario {
    algorithm: Matryoshka,
    batteries: HashSet<u64>,
    system_bounds: PowerMetrics,
}

impl Scenario {
    fn new() -> Self {
        Self {
            algorithm: Matryoshka::new(),
            batteries: batteries(),
            system_bounds: PowerMetrics {
                timestamp: now(),
                inclusion_bounds: Bounds::new(Some(-200.0), Some(200.0)),
                exclusion_bounds: Bounds::new(Some(0.0), Some(0.0)),
            },
        }
    }

    fn tgt_power(
        &mut self,
        priority: i64,
        power: Option<f64>,
        bounds: (Option<f64>, Option<f64>),
        expected: Option<f64>,
    ) {
        self.tgt_power_send(priority, power, bounds, expected, false);
    }

    fn tgt_power_send(
        &mut self,
        priority: i64,
        power: Option<f64>,
        bounds: (Option<f64>, Option<f64>),
        expected: Option<f64>,
        must_send: bool,
    ) {
        let proposal = Proposal {
            battery_ids: self.batteries.clone(),
            source_id: format!("actor-{priority}"),
            preferred_power: power,
            bounds: Bounds::new(bounds.0, bounds.1),
            priority,
        };
        let got = self
            .algorithm
            .calculate_target_power(proposal, self.system_bounds, must_send);
        assert_eq!(got, expected, "priority={priority} power={power:?} bounds={bounds:?}");
    }

    fn bounds(&self, priority: i64, expected_power: Option<f64>, expected_bounds: (f64, f64)) {
        let Report {
            target_power,
            inclusion_bounds,
        } = self
            .algorithm
            .get_status(&self.batteries, priority, self.system_bounds);
        assert_eq!(target_power, expected_power, "priority={priority}");
        assert_eq!(
            inclusion_bounds,
            Bounds::new(Some(expected_bounds.0), Some(expected_bounds.1)),
            "priority={priority}"
        );
    }
}

#[test]
fn matryoshka_algorithm_trace() {
    let mut s = Scenario::new();

    s.tgt_power(2, Some(25.0), (Some(25.0), Some(50.0)), Some(25.0));
    s.bounds(2, Some(25.0), (-200.0, 200.0));
    s.bounds(1, Some(25.0), (25.0, 50.0));

    s.tgt_power(1, Some(20.0), (Some(20.0), Some(50.0)), None);
    s.tgt_power_send(1, Some(20.0), (Some(20.0), Some(50.0)), Some(25.0), true);
    s.bounds(1, Some(25.0), (25.0, 50.0));

    s.tgt_power(3, Some(10.0), (Some(10.0), Some(15.0)), Some(15.0));
    s.bounds(3, Some(15.0), (-200.0, 200.0));
    s.bounds(2, Some(15.0), (10.0, 15.0));
    s.bounds(1, Some(15.0), (10.0, 15.0));

    s.tgt_power(3, Some(10.0), (Some(10.0), Some(22.0)), Some(22.0));
    s.bounds(3, Some(22.0), (-200.0, 200.0));
    s.bounds(2, Some(22.0), (10.0, 22.0));
    s.bounds(1, Some(22.0), (10.0, 22.0));

    s.tgt_power(1, Some(30.0), (Some(20.0), Some(50.0)), None);
    s.bounds(1, Some(22.0), (10.0, 22.0));

    s.tgt_power(3, Some(10.0), (Some(10.0), Some(50.0)), Some(30.0));
    s.bounds(3, Some(30.0), (-200.0, 200.0));
    s.bounds(2, Some(30.0), (10.0, 50.0));
    s.bounds(1, Some(30.0), (25.0, 50.0));

    s.tgt_power(2, Some(40.0), (Some(40.0), None), Some(40.0));
    s.bounds(3, Some(40.0), (-200.0, 200.0));
    s.bounds(2, Some(40.0), (10.0, 50.0));
    s.bounds(1, Some(40.0), (40.0, 50.0));

    s.tgt_power(2, Some(0.0), (None, None), Some(30.0));
    s.bounds(4, Some(30.0), (-200.0, 200.0));
    s.bounds(3, Some(30.0), (-200.0, 200.0));
    s.bounds(2, Some(30.0), (10.0, 50.0));
    s.bounds(1, Some(30.0), (10.0, 50.0));

    s.tgt_power(4, Some(-50.0), (None, Some(-50.0)), Some(-50.0));
    s.bounds(4, Some(-50.0), (-200.0, 200.0));
    s.bounds(3, Some(-50.0), (-200.0, -50.0));
    s.bounds(2, Some(-50.0), (-200.0, -50.0));
    s.bounds(1, Some(-50.0), (-200.0, -50.0));

    s.tgt_power(3, Some(0.0), (Some(-200.0), Some(200.0)), None);
    s.bounds(1, Some(-50.0), (-200.0, -50.0));

    s.tgt_power(1, Some(-150.0), (Some(-200.0), Some(-150.0)), Some(-150.0));
    s.bounds(2, Some(-150.0), (-200.0, -50.0));
    s.bounds(1, Some(-150.0), (-200.0, -50.0));

    s.tgt_power(4, Some(-180.0), (Some(-200.0), Some(-50.0)), None);
    s.bounds(1, Some(-150.0), (-200.0, -50.0));

    s.tgt_power(4, Some(50.0), (Some(50.0), None), Some(50.0));
    s.bounds(4, Some(50.0), (-200.0, 200.0));
    s.bounds(3, Some(50.0), (50.0, 200.0));
    s.bounds(2, Some(50.0), (50.0, 200.0));
    s.bounds(1, Some(50.0), (50.0, 200.0));

    s.tgt_power(4, Some(0.0), (Some(-200.0), Some(200.0)), Some(-150.0));
    s.bounds(4, Some(-150.0), (-200.0, 200.0));
    s.bounds(3, Some(-150.0), (-200.0, 200.0));
    s.bounds(2, Some(-150.0), (-200.0, 200.0));
    s.bounds(1, Some(-150.0), (-200.0, 200.0));

    s.tgt_power(3, Some(0.0), (Some(-200.0), Some(200.0)), None);
    s.bounds(3, Some(-150.0), (-200.0, 200.0));
    s.bounds(2, Some(-150.0), (-200.0, 200.0));
    s.bounds(1, Some(-150.0), (-200.0, 200.0));

    s.tgt_power(2, Some(50.0), (Some(-100.0), Some(100.0)), Some(-100.0));
    s.bounds(3, Some(-100.0), (-200.0, 200.0));
    s.bounds(2, Some(-100.0), (-200.0, 200.0));
    s.bounds(1, Some(-100.0), (-100.0, 100.0));

    s.tgt_power(1, Some(100.0), (Some(100.0), Some(200.0)), Some(100.0));
    s.bounds(1, Some(100.0), (-100.0, 100.0));

    s.tgt_power(1, Some(50.0), (Some(50.0), Some(200.0)), Some(50.0));
    s.bounds(1, Some(50.0), (-100.0, 100.0));

    s.tgt_power(1, Some(200.0), (Some(50.0), Some(200.0)), Some(100.0));
    s.bounds(1, Some(100.0), (-100.0, 100.0));

    s.tgt_power(1, Some(0.0), (Some(-200.0), Some(200.0)), Some(0.0));
    s.bounds(1, Some(0.0), (-100.0, 100.0));

    s.tgt_power(1, None, (Some(-200.0), Some(200.0)), Some(50.0));
    s.bounds(1, Some(50.0), (-100.0, 100.0));
}
