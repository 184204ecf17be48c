use std::time::Duration;

use tokio::time::Instant;

use crate::config::Stage;

/// Elapsed time since the run started.
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    started: Instant,
}

impl RunClock {
    #[must_use]
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running {
        stage_index: usize,
        stage_elapsed: Duration,
    },
    /// Schedule elapsed (or aborted); workers are retiring.
    Draining,
    Complete,
}

/// Where the run is within its stage list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePosition {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// Piecewise-linear target concurrency over a list of stages.
#[derive(Debug, Clone)]
pub struct RampingSchedule {
    start: u64,
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

impl RampingSchedule {
    #[must_use]
    pub fn new(start: u64, stages: Vec<Stage>) -> Self {
        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for s in &stages {
            acc = acc.saturating_add(s.duration);
            cumulative_ends.push(acc);
        }

        Self {
            start,
            stages,
            cumulative_ends,
        }
    }

    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    #[must_use]
    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    /// Stage containing `elapsed`. A boundary belongs to the stage that ends there;
    /// past the end this is the last stage.
    #[must_use]
    pub fn stage_index_at(&self, elapsed: Duration) -> usize {
        self.cumulative_ends
            .partition_point(|end| *end < elapsed)
            .min(self.stages.len().saturating_sub(1))
    }

    #[must_use]
    pub fn target_at(&self, elapsed: Duration) -> u64 {
        self.stage_at(elapsed)
            .map(|s| s.current_target)
            .unwrap_or(self.start)
    }

    #[must_use]
    pub fn stage_at(&self, elapsed: Duration) -> Option<StagePosition> {
        let idx = self.stage_index_at(elapsed);
        let stage = self.stages.get(idx)?;

        let stage_end = self.cumulative_ends[idx];
        let stage_start = if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        };

        let stage_duration = stage_end.saturating_sub(stage_start);
        let stage_elapsed = elapsed.min(stage_end).saturating_sub(stage_start);

        let start_target = if idx == 0 {
            self.start
        } else {
            self.stages[idx - 1].target
        };
        let end_target = stage.target;

        Some(StagePosition {
            index: idx,
            count: self.stages.len(),
            stage_elapsed,
            stage_remaining: stage_duration.saturating_sub(stage_elapsed),
            start_target,
            end_target,
            current_target: interpolate(start_target, end_target, stage_elapsed, stage_duration),
        })
    }

    /// State of a started run at `elapsed`.
    #[must_use]
    pub fn state_at(&self, elapsed: Duration) -> SchedulerState {
        if self.is_done(elapsed) {
            return SchedulerState::Draining;
        }
        match self.stage_at(elapsed) {
            Some(pos) => SchedulerState::Running {
                stage_index: pos.index,
                stage_elapsed: pos.stage_elapsed,
            },
            None => SchedulerState::Draining,
        }
    }
}

/// `c0 + (c1 - c0) * x / d`, rounded to the nearest integer (halves away from zero).
fn interpolate(c0: u64, c1: u64, x: Duration, d: Duration) -> u64 {
    if d.is_zero() || x >= d {
        return c1;
    }

    let start = i128::from(c0);
    let delta = i128::from(c1) - start;

    let den = (d.as_nanos() as i128).max(1);
    // The whole value is rounded, so a tie resolves the same way on up and down ramps.
    let num = start
        .saturating_mul(den)
        .saturating_add(delta.saturating_mul(x.as_nanos() as i128));

    let cur = div_round(num, den);
    cur.clamp(0, i128::from(u64::MAX)) as u64
}

/// `num / den` rounded half away from zero; `den` is positive.
fn div_round(num: i128, den: i128) -> i128 {
    let q = num / den;
    let r = num % den;
    if 2 * r.abs() >= den { q + num.signum() } else { q }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(secs: u64, target: u64) -> Stage {
        Stage {
            duration: Duration::from_secs(secs),
            target,
        }
    }

    #[test]
    fn interpolates_linearly_within_a_stage() {
        let s = RampingSchedule::new(0, vec![stage(10, 10), stage(30, 50)]);
        // 15s into the second stage, which starts at 10.
        assert_eq!(s.target_at(Duration::from_secs(25)), 30);
    }

    #[test]
    fn boundaries_hit_stage_targets_exactly() {
        let s = RampingSchedule::new(0, vec![stage(30, 10), stage(60, 10), stage(30, 0)]);
        assert_eq!(s.target_at(Duration::ZERO), 0);
        assert_eq!(s.target_at(Duration::from_secs(30)), 10);
        assert_eq!(s.target_at(Duration::from_secs(90)), 10);
        assert_eq!(s.target_at(Duration::from_secs(120)), 0);
        assert_eq!(s.target_at(Duration::from_secs(500)), 0);
    }

    #[test]
    fn rounds_to_nearest() {
        let s = RampingSchedule::new(0, vec![stage(4, 1)]);
        assert_eq!(s.target_at(Duration::from_secs(1)), 0);
        assert_eq!(s.target_at(Duration::from_secs(2)), 1);
        assert_eq!(s.target_at(Duration::from_secs(3)), 1);

        let down = RampingSchedule::new(3, vec![stage(2, 0)]);
        assert_eq!(down.target_at(Duration::from_secs(1)), 2);
    }

    #[test]
    fn ties_round_the_same_in_both_directions() {
        let up = RampingSchedule::new(0, vec![stage(2, 5)]);
        let down = RampingSchedule::new(5, vec![stage(2, 0)]);
        assert_eq!(up.target_at(Duration::from_secs(1)), 3);
        assert_eq!(down.target_at(Duration::from_secs(1)), 3);
    }

    #[test]
    fn zero_duration_stage_steps() {
        let s = RampingSchedule::new(5, vec![stage(0, 20), stage(10, 20)]);
        assert_eq!(s.target_at(Duration::from_millis(1)), 20);
        assert_eq!(s.total_duration(), Duration::from_secs(10));
    }

    #[test]
    fn stage_position_reports_progress() {
        let s = RampingSchedule::new(0, vec![stage(10, 10), stage(20, 30)]);
        let pos = s
            .stage_at(Duration::from_secs(15))
            .unwrap_or_else(|| panic!("expected stage"));
        assert_eq!(pos.index, 1);
        assert_eq!(pos.count, 2);
        assert_eq!(pos.stage_elapsed, Duration::from_secs(5));
        assert_eq!(pos.stage_remaining, Duration::from_secs(15));
        assert_eq!((pos.start_target, pos.end_target, pos.current_target), (10, 30, 15));
    }

    #[test]
    fn state_follows_the_clock() {
        let s = RampingSchedule::new(0, vec![stage(10, 10), stage(10, 0)]);
        assert_eq!(
            s.state_at(Duration::from_secs(3)),
            SchedulerState::Running {
                stage_index: 0,
                stage_elapsed: Duration::from_secs(3)
            }
        );
        assert!(matches!(
            s.state_at(Duration::from_secs(12)),
            SchedulerState::Running { stage_index: 1, .. }
        ));
        assert_eq!(s.state_at(Duration::from_secs(20)), SchedulerState::Draining);
    }

    #[test]
    fn stage_index_clamps_past_the_end() {
        let s = RampingSchedule::new(0, vec![stage(1, 1), stage(1, 0)]);
        assert_eq!(s.stage_index_at(Duration::from_secs(60)), 1);
        assert_eq!(RampingSchedule::new(3, Vec::new()).target_at(Duration::from_secs(1)), 3);
    }
}
