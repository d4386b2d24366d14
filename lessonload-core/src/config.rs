use std::fmt;
use std::time::Duration;

use crate::thresholds::ThresholdSet;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} VUs",
            humantime::format_duration(self.duration),
            self.target
        )
    }
}

/// Ordered ramping-VU stages. The run starts at zero VUs; each stage ramps linearly from the
/// previous stage's target to its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSchedule {
    stages: Vec<Stage>,
}

impl StageSchedule {
    pub fn new(stages: Vec<Stage>) -> Result<Self> {
        if stages.is_empty() {
            return Err(Error::InvalidStages);
        }
        let schedule = Self { stages };
        if schedule.total_duration().is_zero() {
            return Err(Error::InvalidStages);
        }
        if schedule.max_target() == 0 {
            return Err(Error::InvalidVus);
        }
        Ok(schedule)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.stages
            .iter()
            .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration))
    }

    /// Highest concurrency any stage ramps to; this is the number of VU slots the runner spawns.
    pub fn max_target(&self) -> u64 {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub schedule: StageSchedule,

    /// Threshold assertions evaluated once the schedule completes.
    pub thresholds: Vec<ThresholdSet>,
}
