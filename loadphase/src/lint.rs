use loadphase_core::{LintReport, LoadProfile, Severity, estimated_iterations_per_worker};

use crate::cli::LintArgs;
use crate::exit_codes::ExitCode;
use crate::run_error::RunError;
use crate::run_support::{load_source, run_overrides};

/// Prints every finding; configuration errors exit with invalid input.
pub async fn lint(args: LintArgs) -> Result<ExitCode, RunError> {
    let spec = load_source(&args.source).await?;
    let report = loadphase_core::lint(spec, run_overrides(&args.overrides));

    print!("{}", render(&report));

    if report.has_errors() {
        Ok(ExitCode::InvalidInput)
    } else {
        Ok(ExitCode::Success)
    }
}

fn render(report: &LintReport) -> String {
    let mut out = String::new();

    if let Some(plan) = &report.plan {
        let load = match &plan.load {
            LoadProfile::Constant { vus, .. } => format!("{} vus={vus}", plan.load.kind()),
            LoadProfile::Ramping { stages, .. } => format!(
                "{} stages={} peak={}",
                plan.load.kind(),
                stages.len(),
                plan.load.peak_workers()
            ),
        };
        out.push_str(&format!(
            "profile: {} ({load}, {} total)\n",
            plan.name,
            humantime::format_duration(plan.load.total_duration())
        ));
        out.push_str(&format!(
            "identity: {} space={} (estimated iterations per worker: {})\n",
            plan.identity.mode(),
            plan.identity.space(),
            estimated_iterations_per_worker(plan)
        ));
        out.push_str(&format!("thresholds: {}\n", plan.thresholds.len()));
    }

    for f in &report.findings {
        out.push_str(&format!("{}: {}\n", f.severity, f.message));
    }

    let errors = report
        .findings
        .iter()
        .filter(|f| f.severity == Severity::Error)
        .count();
    let warnings = report.findings.len() - errors;
    out.push_str(&format!("{errors} error(s), {warnings} warning(s)\n"));

    out
}
