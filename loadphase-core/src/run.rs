use std::sync::Arc;
use std::time::Duration;

use loadphase_metrics::{Aggregator, AggregatorLayout, RunSnapshot, Totals, per_sec};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::Result;
use crate::config::{RunPlan, Stage};
use crate::executor::RequestExecutor;
use crate::pool::WorkerPool;
use crate::progress::{PROGRESS_INTERVAL, ProgressFn, ProgressUpdate};
use crate::schedule::{RampingSchedule, RunClock, SchedulerState};
use crate::signal::Signal;
use crate::thresholds::{RunVerdict, evaluate_thresholds};
use crate::vu::WorkerContext;

#[derive(Debug, Clone)]
pub struct RunReport {
    pub name: String,
    pub snapshot: RunSnapshot,
    pub verdict: RunVerdict,
    /// Start of the run to the last worker exiting.
    pub wall_time: Duration,
    pub peak_workers: usize,
    /// Stages as scheduled; a constant profile is one flat stage.
    pub stages: Vec<Stage>,
    pub aborted: bool,
}

/// Drives a worker pool through `plan`'s schedule, then drains it and evaluates thresholds.
///
/// `abort` cuts the schedule short; the run still drains, reports and evaluates.
pub async fn run_plan<E: RequestExecutor>(
    plan: &RunPlan,
    executor: Arc<E>,
    progress: Option<ProgressFn>,
    abort: Option<Arc<Signal>>,
) -> Result<RunReport> {
    let schedule = Arc::new(plan.load.schedule());
    let metrics = Arc::new(Aggregator::new(AggregatorLayout {
        stages: schedule.stage_count(),
        checks: plan.checks.iter().map(ToString::to_string).collect(),
    }));

    let clock = RunClock::start();
    let mut pool = WorkerPool::new(WorkerContext {
        executor,
        classifier: Arc::new(plan.classifier.clone()),
        identities: plan.identity,
        metrics: metrics.clone(),
        checks: Arc::from(plan.checks.as_slice()),
        think_time: plan.think_time,
        clock,
        schedule: schedule.clone(),
        abandon: Arc::new(Signal::new()),
    });

    info!(
        run = %plan.name,
        executor = %plan.load.kind(),
        stages = schedule.stage_count(),
        duration = ?schedule.total_duration(),
        peak_workers = plan.load.peak_workers(),
        "run started"
    );

    let mut interval = tokio::time::interval(plan.tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut state = SchedulerState::Idle;
    let mut reporter = progress.map(|f| ProgressReporter::new(f, metrics.clone()));
    let mut aborted = false;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            () = wait_for(abort.as_deref()) => aborted = true,
        }

        let elapsed = clock.elapsed();
        let next = if aborted {
            SchedulerState::Draining
        } else {
            schedule.state_at(elapsed)
        };
        transition(&mut state, next, &schedule);
        if state == SchedulerState::Draining {
            break;
        }

        let desired = schedule.target_at(elapsed);
        pool.resize(usize::try_from(desired).unwrap_or(usize::MAX))?;

        if let Some(reporter) = reporter.as_mut() {
            reporter.maybe_emit(elapsed, &schedule, desired, pool.active_count());
        }
    }

    if aborted {
        warn!(elapsed = ?clock.elapsed(), "run aborted; draining workers");
    }
    pool.drain(plan.graceful_stop).await?;
    let wall_time = clock.elapsed();
    transition(&mut state, SchedulerState::Complete, &schedule);

    let snapshot = metrics.snapshot();
    let verdict = evaluate_thresholds(&plan.thresholds, &snapshot, wall_time);

    info!(
        requests = snapshot.total(),
        wall_time = ?wall_time,
        passed = verdict.passed,
        violations = verdict.violations.len(),
        "run complete"
    );

    Ok(RunReport {
        name: plan.name.clone(),
        snapshot,
        verdict,
        wall_time,
        peak_workers: pool.peak(),
        stages: schedule.stages().to_vec(),
        aborted,
    })
}

async fn wait_for(signal: Option<&Signal>) {
    match signal {
        Some(signal) => signal.wait().await,
        None => std::future::pending().await,
    }
}

fn transition(state: &mut SchedulerState, next: SchedulerState, schedule: &RampingSchedule) {
    let changed = match (*state, next) {
        (
            SchedulerState::Running { stage_index: a, .. },
            SchedulerState::Running { stage_index: b, .. },
        ) => a != b,
        (prev, next) => std::mem::discriminant(&prev) != std::mem::discriminant(&next),
    };

    if changed {
        match next {
            SchedulerState::Running { stage_index, .. } => {
                if let Some(stage) = schedule.stages().get(stage_index) {
                    info!(
                        stage = stage_index + 1,
                        of = schedule.stage_count(),
                        target = stage.target,
                        duration = ?stage.duration,
                        "stage started"
                    );
                }
            }
            SchedulerState::Draining => info!("schedule finished; draining workers"),
            SchedulerState::Complete => info!("all workers stopped"),
            SchedulerState::Idle => {}
        }
    }
    *state = next;
}

struct ProgressReporter {
    emit: ProgressFn,
    metrics: Arc<Aggregator>,
    tick: u64,
    last_at: Duration,
    last_totals: Totals,
}

impl ProgressReporter {
    fn new(emit: ProgressFn, metrics: Arc<Aggregator>) -> Self {
        Self {
            emit,
            metrics,
            tick: 0,
            last_at: Duration::ZERO,
            last_totals: Totals::default(),
        }
    }

    fn maybe_emit(
        &mut self,
        elapsed: Duration,
        schedule: &RampingSchedule,
        desired: u64,
        active: usize,
    ) {
        let dt = elapsed.saturating_sub(self.last_at);
        if dt < PROGRESS_INTERVAL {
            return;
        }

        let totals = self.metrics.totals();
        let delta_requests = totals.delta_since(Some(self.last_totals));
        let delta_failures = totals.failure.saturating_sub(self.last_totals.failure);
        let failure_rate_now = if delta_requests == 0 {
            0.0
        } else {
            delta_failures as f64 / delta_requests as f64
        };

        self.tick = self.tick.saturating_add(1);
        self.last_at = elapsed;
        self.last_totals = totals;

        (self.emit)(ProgressUpdate {
            tick: self.tick,
            elapsed,
            total_duration: schedule.total_duration(),
            stage: schedule.stage_at(elapsed),
            desired_workers: desired,
            active_workers: active,
            totals,
            rps_now: per_sec(delta_requests, dt.as_secs_f64()),
            failure_rate_now,
        });
    }
}
