use std::time::Duration;

use crate::config::{Stage, StageSchedule};

/// Where a run currently is within its stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// Time-indexed view of a [`StageSchedule`], answering "how many VUs should be active now".
#[derive(Debug, Clone)]
pub struct RampingSchedule {
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

struct Located {
    index: usize,
    start: Duration,
    end: Duration,
    start_target: u64,
    end_target: u64,
}

impl RampingSchedule {
    pub fn new(schedule: &StageSchedule) -> Self {
        let stages = schedule.stages().to_vec();
        let mut acc = Duration::ZERO;
        let cumulative_ends = stages
            .iter()
            .map(|s| {
                acc = acc.saturating_add(s.duration);
                acc
            })
            .collect();

        Self {
            stages,
            cumulative_ends,
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    fn locate(&self, elapsed: Duration) -> Option<Located> {
        if self.stages.is_empty() {
            return None;
        }

        let index = match self
            .cumulative_ends
            .binary_search_by(|end| end.cmp(&elapsed))
        {
            Ok(i) | Err(i) => i.min(self.stages.len() - 1),
        };

        let start = if index == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[index - 1]
        };
        let start_target = if index == 0 {
            0
        } else {
            self.stages[index - 1].target
        };

        Some(Located {
            index,
            start,
            end: self.cumulative_ends[index],
            start_target,
            end_target: self.stages[index].target,
        })
    }

    /// Linearly interpolated VU target at `elapsed` since the run started.
    pub fn target_at(&self, elapsed: Duration) -> u64 {
        if elapsed.is_zero() {
            return 0;
        }
        if self.is_done(elapsed) {
            return self.stages.last().map_or(0, |s| s.target);
        }
        let Some(at) = self.locate(elapsed) else {
            return 0;
        };

        let stage_duration = at.end.saturating_sub(at.start);
        if stage_duration.is_zero() {
            return at.end_target;
        }

        let from = at.start_target as i128;
        let delta = at.end_target as i128 - from;
        let num = elapsed.saturating_sub(at.start).as_nanos() as i128;
        let den = stage_duration.as_nanos() as i128;

        (from + delta.saturating_mul(num) / den.max(1)).clamp(0, u64::MAX as i128) as u64
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        let clamped = elapsed.min(self.total_duration());
        let at = self.locate(clamped)?;
        let stage_elapsed = clamped.saturating_sub(at.start);

        Some(StageSnapshot {
            index: at.index,
            count: self.stages.len(),
            stage_elapsed,
            stage_remaining: at.end.saturating_sub(at.start).saturating_sub(stage_elapsed),
            start_target: at.start_target,
            end_target: at.end_target,
            current_target: self.target_at(clamped),
        })
    }

    /// How long an idle VU (1-based `vu_index`) should sleep before looking at the target again.
    pub fn next_recheck_in(&self, elapsed: Duration, vu_index: u64) -> Duration {
        let default_sleep = Duration::from_millis(50);

        if self.is_done(elapsed) {
            return Duration::ZERO;
        }
        let Some(at) = self.locate(elapsed) else {
            return default_sleep;
        };

        // Already active: wake soon to notice a ramp-down.
        if vu_index <= self.target_at(elapsed) {
            return Duration::from_millis(1);
        }

        let until_stage_end = at.end.saturating_sub(elapsed).min(default_sleep);
        if at.end_target <= at.start_target || vu_index > at.end_target {
            return until_stage_end;
        }

        // Solve start + (end - start) * t / duration >= vu_index for t.
        let from = at.start_target as i128;
        let delta = at.end_target as i128 - from;
        let want = vu_index as i128;
        if want <= from {
            return Duration::ZERO;
        }

        let stage_ns = at.end.saturating_sub(at.start).as_nanos() as i128;
        let elapsed_ns = elapsed.saturating_sub(at.start).as_nanos() as i128;
        let needed_ns = (want - from).saturating_mul(stage_ns) / delta;
        let wait_ns = (needed_ns - elapsed_ns).max(0);

        Duration::from_nanos(wait_ns.min(u64::MAX as i128) as u64).min(default_sleep)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn ramp() -> RampingSchedule {
        let stages = StageSchedule::new(vec![
            Stage::new(Duration::from_secs(5), 10),
            Stage::new(Duration::from_secs(10), 10),
            Stage::new(Duration::from_secs(5), 0),
        ])
        .unwrap();
        RampingSchedule::new(&stages)
    }

    #[test]
    fn interpolates_within_ramp_up() {
        let s = ramp();
        assert_eq!(s.target_at(Duration::ZERO), 0);
        assert_eq!(s.target_at(Duration::from_millis(2500)), 5);
        assert_eq!(s.target_at(Duration::from_secs(5)), 10);
    }

    #[test]
    fn holds_steady_then_ramps_down() {
        let s = ramp();
        assert_eq!(s.target_at(Duration::from_secs(12)), 10);
        assert_eq!(s.target_at(Duration::from_millis(17_500)), 5);
        assert_eq!(s.target_at(Duration::from_secs(20)), 0);
        assert!(s.is_done(Duration::from_secs(20)));
        assert!(!s.is_done(Duration::from_millis(19_999)));
    }

    #[test]
    fn never_exceeds_declared_maximum() {
        let s = ramp();
        let max = (0..=2100u64)
            .map(|ms10| s.target_at(Duration::from_millis(ms10 * 10)))
            .max()
            .unwrap();
        assert_eq!(max, 10);
    }

    #[test]
    fn snapshot_reports_current_stage() {
        let s = ramp();
        let snap = s.stage_snapshot_at(Duration::from_secs(7)).unwrap();
        assert_eq!(snap.index, 1);
        assert_eq!(snap.count, 3);
        assert_eq!(snap.stage_elapsed, Duration::from_secs(2));
        assert_eq!(snap.stage_remaining, Duration::from_secs(8));
        assert_eq!((snap.start_target, snap.end_target), (10, 10));
        assert_eq!(snap.current_target, 10);
    }

    #[test]
    fn recheck_waits_until_ramp_reaches_vu() {
        let s = ramp();
        // VU 10 becomes active at 5s; from 1s the wait is capped at 50ms.
        assert_eq!(
            s.next_recheck_in(Duration::from_secs(1), 10),
            Duration::from_millis(50)
        );
        // VU 3 is reached at 1.5s.
        assert_eq!(
            s.next_recheck_in(Duration::from_millis(1480), 3),
            Duration::from_millis(20)
        );
        assert_eq!(
            s.next_recheck_in(Duration::from_secs(30), 1),
            Duration::ZERO
        );
    }
}
