use std::sync::Arc;

use loadphase_core::{HttpExecutor, RunPlan, Severity, Signal, lint_plan, run_plan};
use loadphase_http::HttpClient;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;
use crate::run_support::{load_source, run_overrides};

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let spec = load_source(&args.source).await?;
    let plan = RunPlan::resolve(spec, run_overrides(&args.overrides))
        .map_err(|e| RunError::from_core("invalid run configuration", e))?;

    for finding in lint_plan(&plan) {
        if finding.severity == Severity::Warning {
            warn!("{}", finding.message);
        }
    }

    out.print_header(&plan);

    let executor = Arc::new(HttpExecutor::new(
        HttpClient::default(),
        plan.target.clone(),
        plan.timeout,
    ));

    let abort = Arc::new(Signal::new());
    let ctrl_c = tokio::spawn({
        let abort = abort.clone();
        async move {
            if watch_interrupts(abort, tokio::signal::ctrl_c).await {
                warn!("interrupted again; exiting without waiting for in-flight requests");
                std::process::exit(ExitCode::RuntimeError.as_i32());
            }
        }
    });

    let result = run_plan(&plan, executor, out.progress(), Some(abort)).await;
    ctrl_c.abort();
    let report = result.map_err(|e| RunError::from_core("run failed", e))?;

    out.print_summary(&report).map_err(RunError::RuntimeError)?;

    Ok(ExitCode::from_verdict(report.verdict.passed))
}

/// The first interrupt raises `abort` so the run drains and still reports. Returns `true`
/// on a second interrupt and `false` if interrupts cannot be observed.
async fn watch_interrupts<F, Fut>(abort: Arc<Signal>, mut interrupted: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupted().await.is_err() {
        return false;
    }
    info!("interrupted; stopping the schedule (interrupt again to exit now)");
    abort.raise();

    interrupted().await.is_ok()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::pin::Pin;
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;

    type Press = Pin<Box<dyn Future<Output = std::io::Result<()>> + Send>>;

    /// Each call resolves once `notify` is signalled.
    fn presses(notify: &Arc<Notify>) -> impl FnMut() -> Press + Send + 'static {
        let notify = notify.clone();
        move || {
            let notify = notify.clone();
            Box::pin(async move {
                notify.notified().await;
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn first_interrupt_aborts_and_second_exits() {
        let abort = Arc::new(Signal::new());
        let notify = Arc::new(Notify::new());
        let watcher = tokio::spawn(watch_interrupts(abort.clone(), presses(&notify)));

        notify.notify_one();
        tokio::time::timeout(Duration::from_secs(1), abort.wait())
            .await
            .unwrap();
        assert!(!watcher.is_finished());

        notify.notify_one();
        let exit_now = tokio::time::timeout(Duration::from_secs(1), watcher)
            .await
            .unwrap()
            .unwrap();
        assert!(exit_now);
    }

    #[tokio::test]
    async fn unavailable_interrupts_leave_the_run_alone() {
        let abort = Arc::new(Signal::new());
        let exit_now = watch_interrupts(abort.clone(), || async {
            Err(std::io::Error::other("no signal handler"))
        })
        .await;
        assert!(!exit_now);
        assert!(!abort.is_raised());
    }
}
