use std::sync::Arc;

mod format;
mod progress;
mod summary;

use format::{format_duration, format_percent, format_rate};
use loadphase_core::{LoadProfile, RunPlan};
use progress::HumanProgress;
use summary::render;

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, plan: &RunPlan) {
        println!("profile: {}", plan.name);
        match &plan.load {
            LoadProfile::Constant { vus, duration } => {
                println!(
                    "load: {} vus={vus} duration={}",
                    plan.load.kind(),
                    format_duration(*duration)
                );
            }
            LoadProfile::Ramping { start_vus, stages } => {
                let shape = stages
                    .iter()
                    .map(|s| format!("{}@{}", s.target, format_duration(s.duration)))
                    .collect::<Vec<_>>()
                    .join(" -> ");
                println!(
                    "load: {} start={start_vus} stages={shape} peak={}",
                    plan.load.kind(),
                    plan.load.peak_workers()
                );
            }
        }
        println!(
            "identity: {} space={}",
            plan.identity.mode(),
            plan.identity.space()
        );
        println!();
    }

    fn progress(&self) -> Option<loadphase_core::ProgressFn> {
        let progress = self.progress.clone();

        Some(Arc::new(move |u| {
            let stage = match &u.stage {
                Some(s) if s.count > 1 => format!(
                    "stage={}/{} target={} stage_remaining={} ",
                    s.index + 1,
                    s.count,
                    s.current_target,
                    format_duration(s.stage_remaining)
                ),
                _ => String::new(),
            };

            let message = format!(
                "{stage}workers={}/{} elapsed={} rps={} failed={} requests={}",
                u.active_workers,
                u.desired_workers,
                format_duration(u.elapsed),
                format_rate(u.rps_now),
                format_percent(u.failure_rate_now),
                u.totals.requests
            );

            progress.update("run", u.total_duration, u.elapsed, message);
        }))
    }

    fn print_summary(&self, report: &loadphase_core::RunReport) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(report));

        if !report.verdict.passed {
            eprintln!("thresholds failed: {}", report.verdict.violations.len());
        }

        Ok(())
    }
}
