//! Wall-clock aligned tick scheduling.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::time::Instant as TokioInstant;

/// One observed tick: the scheduled wall-clock instant and the drift
/// (`now_at_wake - scheduled_tick`) observed when the caller actually woke.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    /// The deterministic, drift-independent scheduled instant for this tick.
    pub scheduled: DateTime<Utc>,
    /// `now_at_wake - scheduled`. Positive means the wake happened late.
    pub drift: chrono::Duration,
}

/// Emits ticks at multiples of `period`, anchored to an optional `align_to`
/// wall-clock instant, per `SPEC_FULL.md` §4.4.
#[derive(Debug)]
pub struct AlignedTimer {
    period: StdDuration,
    next_scheduled: DateTime<Utc>,
    next_sleep_until: TokioInstant,
}

impl AlignedTimer {
    /// Construct a timer with the given period and optional alignment anchor.
    ///
    /// `now_wall`/`now_mono` must represent the same instant in their
    /// respective clocks; callers typically pass `Utc::now()` and
    /// `tokio::time::Instant::now()` taken back to back.
    #[must_use]
    pub fn new(
        period: StdDuration,
        align_to: Option<DateTime<Utc>>,
        now_wall: DateTime<Utc>,
        now_mono: TokioInstant,
    ) -> Self {
        let period_chrono = chrono::Duration::from_std(period).expect("period must fit i64 ms");

        let (first_tick, start_delay) = match align_to {
            None => (now_wall + period_chrono, period_chrono),
            Some(anchor) => {
                let elapsed_ms =
                    (now_wall - anchor).num_milliseconds().rem_euclid(period_chrono.num_milliseconds().max(1));
                let elapsed = chrono::Duration::milliseconds(elapsed_ms);
                if elapsed_ms == 0 {
                    (now_wall + period_chrono, period_chrono)
                } else {
                    (
                        now_wall + period_chrono * 2 - elapsed,
                        period_chrono - elapsed,
                    )
                }
            }
        };

        let start_delay_std = start_delay.to_std().unwrap_or(StdDuration::ZERO);
        Self {
            period,
            next_scheduled: first_tick,
            next_sleep_until: now_mono + start_delay_std,
        }
    }

    /// Sleep until the next scheduled tick and return it.
    ///
    /// Advances the schedule by exactly one `period` regardless of how late
    /// the wake actually happens, guaranteeing deterministic output
    /// timestamps.
    pub async fn tick(&mut self) -> Tick {
        tokio::time::sleep_until(self.next_sleep_until).await;
        let scheduled = self.next_scheduled;
        let now = Utc::now();
        let drift = now - scheduled;

        let period_chrono = chrono::Duration::from_std(self.period).expect("period must fit i64 ms");
        self.next_scheduled = scheduled + period_chrono;
        self.next_sleep_until += self.period;

        Tick { scheduled, drift }
    }

    /// The configured period.
    #[must_use]
    pub const fn period(&self) -> StdDuration {
        self.period
    }

    /// The wall-clock instant of the next tick that has not yet fired.
    #[must_use]
    pub const fn next_scheduled(&self) -> DateTime<Utc> {
        self.next_scheduled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_align_to_first_tick_is_now_plus_period() {
        let now_wall = DateTime::from_timestamp(1000, 0).unwrap();
        let now_mono = TokioInstant::now();
        let timer = AlignedTimer::new(StdDuration::from_secs(5), None, now_wall, now_mono);
        assert_eq!(timer.next_scheduled, DateTime::from_timestamp(1005, 0).unwrap());
    }

    #[test]
    fn aligned_on_boundary_first_tick_is_now_plus_period() {
        let anchor = DateTime::from_timestamp(1000, 0).unwrap();
        let now_wall = DateTime::from_timestamp(1010, 0).unwrap(); // exactly 2 periods elapsed
        let now_mono = TokioInstant::now();
        let timer = AlignedTimer::new(StdDuration::from_secs(5), Some(anchor), now_wall, now_mono);
        assert_eq!(timer.next_scheduled, DateTime::from_timestamp(1015, 0).unwrap());
    }

    #[test]
    fn aligned_off_boundary_first_tick_has_grace_period() {
        let anchor = DateTime::from_timestamp(1000, 0).unwrap();
        let now_wall = DateTime::from_timestamp(1003, 0).unwrap(); // elapsed = 3s into a 5s period
        let now_mono = TokioInstant::now();
        let timer = AlignedTimer::new(StdDuration::from_secs(5), Some(anchor), now_wall, now_mono);
        // first tick = now + 2*period - elapsed = 1003 + 10 - 3 = 1010
        assert_eq!(timer.next_scheduled, DateTime::from_timestamp(1010, 0).unwrap());
    }
}
