use std::sync::Arc;
use std::time::Duration;

use loadphase_metrics::{Aggregator, FailureCause, Outcome, Sample};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::checks::Check;
use crate::classify::Classifier;
use crate::executor::RequestExecutor;
use crate::identity::{IdentityGenerator, WorkerIdentity};
use crate::schedule::{RampingSchedule, RunClock};
use crate::signal::Signal;

/// Everything a worker shares with the rest of the run.
#[derive(Debug)]
pub struct WorkerContext<E> {
    pub executor: Arc<E>,
    pub classifier: Arc<Classifier>,
    pub identities: IdentityGenerator,
    pub metrics: Arc<Aggregator>,
    pub checks: Arc<[Check]>,
    pub think_time: Duration,
    pub clock: RunClock,
    pub schedule: Arc<RampingSchedule>,
    /// Raised when the graceful stop window closes; in-flight requests are dropped.
    pub abandon: Arc<Signal>,
}

impl<E> Clone for WorkerContext<E> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            classifier: self.classifier.clone(),
            identities: self.identities,
            metrics: self.metrics.clone(),
            checks: self.checks.clone(),
            think_time: self.think_time,
            clock: self.clock,
            schedule: self.schedule.clone(),
            abandon: self.abandon.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Saw its retire signal at the top of the loop.
    Retired,
    /// Used up its identity space.
    Exhausted,
    /// Its in-flight request was dropped at the end of the graceful stop window.
    Abandoned,
}

/// Runs iterations until retired. Returns the identity so the pool can reuse its index.
pub async fn run_worker<E: RequestExecutor>(
    ctx: WorkerContext<E>,
    mut identity: WorkerIdentity,
    retire: Arc<Signal>,
) -> (WorkerIdentity, WorkerExit) {
    loop {
        if retire.is_raised() {
            return (identity, WorkerExit::Retired);
        }

        let Some(request_id) = ctx.identities.identity_for(&identity) else {
            warn!(
                worker = identity.index(),
                iterations = identity.iterations(),
                space = ctx.identities.space(),
                "identity space exhausted; worker stops"
            );
            return (identity, WorkerExit::Exhausted);
        };

        let started = Instant::now();
        let exchange = tokio::select! {
            biased;
            exchange = ctx.executor.execute(request_id) => exchange,
            () = ctx.abandon.wait() => {
                ctx.metrics.record(&Sample {
                    outcome: Outcome::Failure,
                    cause: Some(FailureCause::Abandoned),
                    latency: started.elapsed(),
                    stage: ctx.schedule.stage_index_at(ctx.clock.elapsed()),
                });
                debug!(worker = identity.index(), request_id, "in-flight request abandoned");
                return (identity, WorkerExit::Abandoned);
            }
        };

        let class = ctx.classifier.classify(&exchange);
        if class.cause == Some(FailureCause::UnexpectedStatus)
            && let Some(status) = exchange.status
        {
            if ctx.metrics.note_unexpected_status(status) {
                warn!(status, request_id, "unexpected status counted as failure");
            } else {
                debug!(status, request_id, "unexpected status");
            }
        }

        for (idx, check) in ctx.checks.iter().enumerate() {
            ctx.metrics.record_check(idx, check.evaluate(&exchange, class.outcome));
        }

        ctx.metrics.record(&Sample {
            outcome: class.outcome,
            cause: class.cause,
            latency: exchange.latency,
            stage: ctx.schedule.stage_index_at(ctx.clock.elapsed()),
        });
        identity.advance();

        if !ctx.think_time.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(ctx.think_time) => {}
                () = retire.wait() => {}
            }
        }
    }
}
