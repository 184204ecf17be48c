use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::Result;
use crate::executor::RequestExecutor;
use crate::identity::WorkerIdentity;
use crate::signal::Signal;
use crate::vu::{WorkerContext, WorkerExit, run_worker};

#[derive(Debug)]
struct ActiveWorker {
    index: u64,
    retire: Arc<Signal>,
}

/// Set of running workers, resized only by the scheduler.
///
/// Worker indices start at 1. An index is reused only after its previous worker has
/// exited, and it keeps its iteration count, so identities never repeat in unique mode.
pub struct WorkerPool<E: RequestExecutor> {
    ctx: WorkerContext<E>,
    tasks: JoinSet<(WorkerIdentity, WorkerExit)>,
    active: Vec<ActiveWorker>,
    parked: BTreeMap<u64, WorkerIdentity>,
    next_index: u64,
    peak: usize,
}

impl<E: RequestExecutor> WorkerPool<E> {
    pub fn new(ctx: WorkerContext<E>) -> Self {
        Self {
            ctx,
            tasks: JoinSet::new(),
            active: Vec::new(),
            parked: BTreeMap::new(),
            next_index: 1,
            peak: 0,
        }
    }

    /// Workers that are neither retiring nor finished.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn peak(&self) -> usize {
        self.peak
    }

    /// Collects finished workers without waiting.
    pub fn reap(&mut self) -> Result<()> {
        while let Some(res) = self.tasks.try_join_next() {
            let (identity, exit) = res?;
            self.settle(identity, exit);
        }
        Ok(())
    }

    /// Spawns or retires workers until `desired` are active. Retires the newest first.
    pub fn resize(&mut self, desired: usize) -> Result<()> {
        self.reap()?;

        let before = self.active.len();
        while self.active.len() < desired {
            self.spawn();
        }
        while self.active.len() > desired {
            if let Some(worker) = self.active.pop() {
                worker.retire.raise();
            }
        }

        if before != desired {
            debug!(from = before, to = desired, live = self.tasks.len(), "pool resized");
        }
        Ok(())
    }

    /// Retires every worker and waits up to `grace` for in-flight requests; whatever is
    /// still running after that is abandoned and recorded as failed.
    pub async fn drain(&mut self, grace: Duration) -> Result<()> {
        for worker in self.active.drain(..) {
            worker.retire.raise();
        }

        let deadline = tokio::time::sleep(grace);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                biased;
                res = self.tasks.join_next() => match res {
                    Some(res) => {
                        let (identity, exit) = res?;
                        self.settle(identity, exit);
                    }
                    None => return Ok(()),
                },
                () = &mut deadline => break,
            }
        }

        warn!(
            in_flight = self.tasks.len(),
            grace = ?grace,
            "graceful stop elapsed; abandoning in-flight requests"
        );
        self.ctx.abandon.raise();
        while let Some(res) = self.tasks.join_next().await {
            let (identity, exit) = res?;
            self.settle(identity, exit);
        }
        Ok(())
    }

    fn spawn(&mut self) {
        let identity = match self.parked.pop_first() {
            Some((_, identity)) => identity,
            None => {
                let identity = WorkerIdentity::new(self.next_index);
                self.next_index = self.next_index.saturating_add(1);
                identity
            }
        };

        let retire = Arc::new(Signal::new());
        self.active.push(ActiveWorker {
            index: identity.index(),
            retire: retire.clone(),
        });
        self.tasks
            .spawn(run_worker(self.ctx.clone(), identity, retire));
        self.peak = self.peak.max(self.active.len());
    }

    fn settle(&mut self, identity: WorkerIdentity, exit: WorkerExit) {
        match exit {
            WorkerExit::Retired => {
                self.parked.insert(identity.index(), identity);
            }
            // The slot is refilled with a fresh index on the next resize.
            WorkerExit::Exhausted => self.active.retain(|w| w.index != identity.index()),
            WorkerExit::Abandoned => {}
        }
    }
}
