//! Priority-tier power arbitration ("Matryoshka"): reconciles power
//! proposals from nested authority tiers into a single target power,
//! subject to system and per-tier bounds.

use std::collections::{BTreeMap, HashSet};

use pulsegrid_core::sample::Bounds;

/// System-wide envelope supplied per Matryoshka call.
///
/// `exclusion_bounds` must lie inside `inclusion_bounds`; either may be
/// zero-width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerMetrics {
    /// Timestamp this envelope was observed at.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// The interval a target power must lie within.
    pub inclusion_bounds: Bounds,
    /// A sub-interval of `inclusion_bounds` a target power must avoid.
    pub exclusion_bounds: Bounds,
}

/// A priority-tagged power request from one named source.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    /// The set of batteries this proposal addresses.
    pub battery_ids: HashSet<u64>,
    /// Identity of the proposing source, unique within a priority tier.
    pub source_id: String,
    /// The power this tier would like, if it has an opinion.
    pub preferred_power: Option<f64>,
    /// The interval this tier considers acceptable.
    pub bounds: Bounds,
    /// Priority rank; higher values are more authoritative.
    pub priority: i64,
}

/// Synchronous answer returned to a tier describing the bounds visible to
/// it and the currently selected target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
    /// The most recently computed target for the queried battery set, if any.
    pub target_power: Option<f64>,
    /// The interval visible to the querying tier, after higher-priority
    /// tiers have narrowed it.
    pub inclusion_bounds: Bounds,
}

type BatterySetKey = Vec<u64>;

fn battery_set_key(ids: &HashSet<u64>) -> BatterySetKey {
    let mut v: Vec<u64> = ids.iter().copied().collect();
    v.sort_unstable();
    v
}

#[derive(Default)]
struct Ledger {
    // keyed by source_id within one battery set; BTreeMap keeps a stable
    // iteration order we re-sort by priority on every recompute.
    proposals: BTreeMap<String, Proposal>,
    last_target: Option<f64>,
}

/// Owns a persistent per-battery-set proposal ledger and reconciles
/// proposals into a single target power per `SPEC_FULL.md` §4.7.
#[derive(Default)]
pub struct Matryoshka {
    ledgers: std::collections::HashMap<BatterySetKey, Ledger>,
}

impl Matryoshka {
    /// Construct an empty arbitration ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `proposal` in the ledger for its battery set, then
    /// recompute the target power for that battery set.
    ///
    /// Returns the new target iff it differs from the last one returned for
    /// this battery set, or always when `must_send` is true.
    pub fn calculate_target_power(
        &mut self,
        proposal: Proposal,
        system_bounds: PowerMetrics,
        must_send: bool,
    ) -> Option<f64> {
        let key = battery_set_key(&proposal.battery_ids);
        let ledger = self.ledgers.entry(key).or_default();
        ledger.proposals.insert(proposal.source_id.clone(), proposal);

        let mut tiers: Vec<&Proposal> = ledger.proposals.values().collect();
        tiers.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut interval = system_bounds.inclusion_bounds;
        let mut target: Option<f64> = None;
        let mut clamped = false;

        for tier in tiers {
            match interval.intersect(&tier.bounds) {
                Some(narrowed) => {
                    interval = narrowed;
                    if !clamped && let Some(pref) = tier.preferred_power {
                        target = Some(interval.clip(pref));
                    }
                }
                None => {
                    if !clamped {
                        if let Some(pref) = tier.preferred_power {
                            target = Some(interval.clip(pref));
                        }
                        clamped = true;
                    }
                }
            }
        }

        let mut computed = target.unwrap_or_else(|| interval.clip(0.0));
        computed = system_bounds.exclusion_bounds.project_out(computed);

        let changed = ledger.last_target != Some(computed);
        ledger.last_target = Some(computed);

        if must_send || changed {
            Some(computed)
        } else {
            None
        }
    }

    /// Report the bounds visible to `tier_priority` (after higher-priority
    /// tiers narrow it) and the most recently computed target for
    /// `battery_ids`.
    #[must_use]
    pub fn get_status(
        &self,
        battery_ids: &HashSet<u64>,
        tier_priority: i64,
        system_bounds: PowerMetrics,
    ) -> Report {
        let key = battery_set_key(battery_ids);
        let Some(ledger) = self.ledgers.get(&key) else {
            return Report {
                target_power: None,
                inclusion_bounds: system_bounds.inclusion_bounds,
            };
        };

        let mut tiers: Vec<&Proposal> = ledger
            .proposals
            .values()
            .filter(|p| p.priority > tier_priority)
            .collect();
        tiers.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut interval = system_bounds.inclusion_bounds;
        for tier in tiers {
            if let Some(narrowed) = interval.intersect(&tier.bounds) {
                interval = narrowed;
            }
        }

        Report {
            target_power: ledger.last_target,
            inclusion_bounds: interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(xs: &[u64]) -> HashSet<u64> {
        xs.iter().copied().collect()
    }

    fn metrics(lower: f64, upper: f64) -> PowerMetrics {
        PowerMetrics {
            timestamp: chrono::DateTime::from_timestamp(0, 0).unwrap(),
            inclusion_bounds: Bounds::new(Some(lower), Some(upper)),
            exclusion_bounds: Bounds::unbounded(),
        }
    }

    fn proposal(source: &str, priority: i64, pref: Option<f64>, lower: f64, upper: f64) -> Proposal {
        Proposal {
            battery_ids: ids(&[1]),
            source_id: source.into(),
            preferred_power: pref,
            bounds: Bounds::new(Some(lower), Some(upper)),
            priority,
        }
    }

    #[test]
    fn single_tier_clips_preferred_into_system_bounds() {
        let mut m = Matryoshka::new();
        let p = proposal("a", 1, Some(500.0), -200.0, 200.0);
        let target = m.calculate_target_power(p, metrics(-200.0, 200.0), true);
        assert_eq!(target, Some(200.0));
    }

    #[test]
    fn higher_priority_bounds_narrow_without_overriding_target() {
        let mut m = Matryoshka::new();
        let sb = metrics(-200.0, 200.0);
        let t1 = m.calculate_target_power(proposal("p2", 2, Some(25.0), 25.0, 50.0), sb, true);
        assert_eq!(t1, Some(25.0));

        let t2 = m.calculate_target_power(proposal("p1", 1, Some(20.0), 20.0, 50.0), sb, true);
        assert_eq!(t2, Some(25.0));

        let status = m.get_status(&ids(&[1]), 1, sb);
        assert_eq!(status.target_power, Some(25.0));
        assert_eq!(status.inclusion_bounds, Bounds::new(Some(25.0), Some(50.0)));
    }

    #[test]
    fn no_return_when_target_unchanged_and_must_send_false() {
        let mut m = Matryoshka::new();
        let sb = metrics(-200.0, 200.0);
        let t1 = m.calculate_target_power(proposal("a", 1, Some(10.0), -50.0, 50.0), sb, false);
        assert_eq!(t1, Some(10.0));

        let t2 = m.calculate_target_power(proposal("a", 1, Some(10.0), -50.0, 50.0), sb, false);
        assert_eq!(t2, None);
    }

    #[test]
    fn conflicting_tier_latches_clamp_for_lower_tiers() {
        // Highest priority tier's bounds conflict with a lower tier's
        // established interval; its own preferred_power wins the target,
        // and clamp latches so still-lower tiers can narrow but not re-set it.
        let mut m = Matryoshka::new();
        let sb = metrics(-200.0, 200.0);

        m.calculate_target_power(proposal("p2", 2, Some(25.0), 0.0, 100.0), sb, true);
        let t = m.calculate_target_power(proposal("p3", 3, Some(10.0), 10.0, 15.0), sb, true);

        // priority 3 (highest) is visited first: [10,15] ∩ [-200,200] is
        // non-empty, so target = clip(10, [10,15]) = 10, interval = [10,15].
        // priority 2 next: [0,100] ∩ [10,15] = [10,15], still non-empty, so
        // clamped never latches and its own preferred_power (25) overrides,
        // clipped into [10,15] -> 15.
        assert_eq!(t, Some(15.0));

        let status = m.get_status(&ids(&[1]), 2, sb);
        assert_eq!(status.inclusion_bounds, Bounds::new(Some(10.0), Some(15.0)));
    }

    #[test]
    fn no_preferred_power_projects_zero_into_interval() {
        let mut m = Matryoshka::new();
        let sb = metrics(10.0, 50.0);
        let t = m.calculate_target_power(proposal("a", 1, None, 10.0, 50.0), sb, true);
        assert_eq!(t, Some(10.0));
    }

    #[test]
    fn exclusion_zone_pushes_target_to_nearer_endpoint() {
        let mut m = Matryoshka::new();
        let sb = PowerMetrics {
            timestamp: chrono::DateTime::from_timestamp(0, 0).unwrap(),
            inclusion_bounds: Bounds::new(Some(-100.0), Some(100.0)),
            exclusion_bounds: Bounds::new(Some(-10.0), Some(10.0)),
        };
        let t = m.calculate_target_power(proposal("a", 1, Some(3.0), -100.0, 100.0), sb, true);
        assert_eq!(t, Some(10.0));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_proposal(priority: i64) -> impl Strategy<Value = Proposal> {
        (-150.0..150.0f64, -150.0..150.0f64, -150.0..150.0f64).prop_map(
            move |(pref, a, b)| {
                let (lower, upper) = if a <= b { (a, b) } else { (b, a) };
                Proposal {
                    battery_ids: [1].into_iter().collect(),
                    source_id: format!("source-{priority}"),
                    preferred_power: Some(pref),
                    bounds: Bounds::new(Some(lower), Some(upper)),
                    priority,
                }
            },
        )
    }

    proptest! {
        // The same final set of per-priority proposals must settle on the
        // same target power no matter the order the tiers last reported in,
        // since `calculate_target_power` always re-sorts by priority before
        // folding.
        #[test]
        fn final_target_is_independent_of_submission_order(
            p1 in arb_proposal(1),
            p2 in arb_proposal(2),
            p3 in arb_proposal(3),
        ) {
            let sb = PowerMetrics {
                timestamp: chrono::DateTime::from_timestamp(0, 0).unwrap(),
                inclusion_bounds: Bounds::new(Some(-200.0), Some(200.0)),
                exclusion_bounds: Bounds::unbounded(),
            };

            let mut forward = Matryoshka::new();
            forward.calculate_target_power(p1.clone(), sb, true);
            forward.calculate_target_power(p2.clone(), sb, true);
            let forward_final = forward.calculate_target_power(p3.clone(), sb, true);

            let mut reversed = Matryoshka::new();
            reversed.calculate_target_power(p3, sb, true);
            reversed.calculate_target_power(p2, sb, true);
            let reversed_final = reversed.calculate_target_power(p1, sb, true);

            prop_assert_eq!(forward_final, reversed_final);
        }
    }
}
