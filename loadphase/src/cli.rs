use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use loadphase_core::{IdentityMode, Phase};
use strum::IntoEnumIterator as _;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    // Bare integers are seconds.
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| format!("duration '{s}' is too large"));
    }

    humantime::parse_duration(s)
        .map_err(|e| format!("invalid duration '{s}': {e} (expected e.g. 10s, 250ms, 1m)"))
}

fn parse_phase(input: &str) -> Result<Phase, String> {
    input
        .parse::<Phase>()
        .map_err(|_| format!("unknown phase '{input}' (expected one of: {})", phase_names()))
}

fn parse_identity_mode(input: &str) -> Result<IdentityMode, String> {
    input
        .parse::<IdentityMode>()
        .map_err(|_| format!("unknown identity mode '{input}' (expected unique or repeat)"))
}

/// `METRIC=EXPR`, e.g. `failed_requests=rate<0.01`.
fn parse_threshold(input: &str) -> Result<(String, String), String> {
    let (metric, expr) = input
        .split_once('=')
        .ok_or_else(|| format!("invalid --threshold '{input}' (expected METRIC=EXPR)"))?;
    let metric = metric.trim();
    let expr = expr.trim();
    if metric.is_empty() || expr.is_empty() {
        return Err(format!("invalid --threshold '{input}' (expected METRIC=EXPR)"));
    }
    Ok((metric.to_string(), expr.to_string()))
}

fn phase_names() -> String {
    Phase::iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable progress bar and summary.
    HumanReadable,
    /// Emit JSON progress lines and a final summary line (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "loadphase",
    author,
    version,
    about = "Phased load generator for a limited-issuance endpoint",
    long_about = "loadphase drives a pool of virtual workers through a staged load profile against one HTTP endpoint, classifies every response as success, conflict, exhausted or failure, and gates the run on thresholds.\n\nEvery request carries a unique numeric identity (worker index * identity space + iteration), so duplicates the server reports are real conflicts.",
    after_help = "Examples:\n  loadphase run --phase baseline --base-url http://localhost:8080\n  loadphase run --phase spike --threshold failed_requests=rate<0.1 --output json\n  loadphase run --profile soak.yaml --vus 50 --duration 2m\n  loadphase export-profile --phase rampup --out rampup.yaml\n  loadphase lint --profile rampup.yaml"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug). LOADPHASE_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load profile against the target
    #[command(
        long_about = "Run a built-in phase or a YAML profile.\n\nCLI flags override values from the profile; --vus/--duration turn a ramping profile into a constant one."
    )]
    Run(RunArgs),

    /// Validate a profile and report risky settings without sending traffic
    Lint(LintArgs),

    /// List the built-in phases
    Phases,

    /// Write a built-in phase as an editable YAML profile
    ExportProfile(ExportProfileArgs),
}

#[derive(Debug, Clone, Args)]
pub struct SourceArgs {
    /// Built-in phase (baseline, rampup, stress, spike, failure)
    #[arg(long, value_name = "NAME", value_parser = parse_phase, conflicts_with = "profile")]
    pub phase: Option<Phase>,

    /// YAML profile file
    #[arg(long, value_name = "FILE")]
    pub profile: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct OverrideArgs {
    /// Target base URL
    #[arg(long, env = "BASE_URL", value_name = "URL")]
    pub base_url: Option<String>,

    /// Run a constant number of workers
    #[arg(long)]
    pub vus: Option<u64>,

    /// Run for this long (e.g. 10s, 250ms, 1m)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Per-request timeout
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Pause between a worker's requests
    #[arg(long, value_parser = parse_duration)]
    pub think_time: Option<Duration>,

    /// `unique` (one identity per request) or `repeat` (one per worker)
    #[arg(long, value_name = "MODE", value_parser = parse_identity_mode)]
    pub identity_mode: Option<IdentityMode>,

    /// Identities reserved per worker (K)
    #[arg(long, value_name = "K")]
    pub identity_space: Option<u64>,

    /// Replace the profile's thresholds for METRIC (repeatable, METRIC=EXPR)
    #[arg(long = "threshold", value_name = "METRIC=EXPR", value_parser = parse_threshold)]
    pub thresholds: Vec<(String, String)>,

    /// Scheduler tick (1ms..=1s)
    #[arg(long, value_parser = parse_duration)]
    pub tick: Option<Duration>,

    /// How long in-flight requests may finish after the schedule ends
    #[arg(long, value_parser = parse_duration)]
    pub graceful_stop: Option<Duration>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

#[derive(Debug, Args)]
pub struct LintArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

#[derive(Debug, Args)]
pub struct ExportProfileArgs {
    /// Built-in phase to export
    #[arg(long, value_name = "NAME", value_parser = parse_phase)]
    pub phase: Phase,

    /// Output YAML path (parent directories are created)
    #[arg(long, value_name = "FILE")]
    pub out: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        match Cli::try_parse_from(args) {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        }
    }

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("1m30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("15"), Ok(Duration::from_secs(15)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn parse_threshold_splits_on_first_equals() {
        assert_eq!(
            parse_threshold("failure=count==0"),
            Ok(("failure".to_string(), "count==0".to_string()))
        );
        assert!(parse_threshold("rate<0.01").is_err());
        assert!(parse_threshold("=rate<0.01").is_err());
    }

    #[test]
    fn cli_parses_run_with_overrides() {
        let cli = parse(&[
            "loadphase",
            "-vv",
            "run",
            "--phase",
            "spike",
            "--base-url",
            "http://127.0.0.1:9000",
            "--vus",
            "5",
            "--duration",
            "250ms",
            "--identity-mode",
            "repeat",
            "--threshold",
            "failed_requests=rate<0.1",
            "--threshold",
            "request_duration=p(95)<300",
            "--output",
            "json",
        ]);

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.source.phase, Some(Phase::Spike));
                assert_eq!(args.source.profile, None);
                let o = &args.overrides;
                assert_eq!(o.base_url.as_deref(), Some("http://127.0.0.1:9000"));
                assert_eq!(o.vus, Some(5));
                assert_eq!(o.duration, Some(Duration::from_millis(250)));
                assert_eq!(o.identity_mode, Some(IdentityMode::Repeat));
                assert_eq!(o.thresholds.len(), 2);
                assert_eq!(args.output, OutputFormat::Json);
            }
            other => panic!("expected run command, got {other:?}"),
        }
    }

    #[test]
    fn phase_and_profile_conflict() {
        let parsed = Cli::try_parse_from([
            "loadphase",
            "lint",
            "--phase",
            "baseline",
            "--profile",
            "p.yaml",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn unknown_phase_lists_the_choices() {
        let err = match Cli::try_parse_from(["loadphase", "run", "--phase", "soak"]) {
            Ok(_) => panic!("expected an error"),
            Err(err) => err.to_string(),
        };
        assert!(err.contains("baseline, rampup, stress, spike, failure"), "{err}");
    }

    #[test]
    fn unknown_identity_mode_is_rejected_while_parsing() {
        let err = match Cli::try_parse_from([
            "loadphase",
            "run",
            "--vus",
            "1",
            "--identity-mode",
            "shared",
        ]) {
            Ok(_) => panic!("expected an error"),
            Err(err) => err.to_string(),
        };
        assert!(err.contains("unknown identity mode 'shared'"), "{err}");

        let cli = parse(&["loadphase", "lint", "--identity-mode", "Repeat"]);
        match cli.command {
            Command::Lint(args) => {
                assert_eq!(args.overrides.identity_mode, Some(IdentityMode::Repeat));
            }
            other => panic!("expected lint command, got {other:?}"),
        }
    }

    #[test]
    fn export_requires_phase_and_out() {
        assert!(Cli::try_parse_from(["loadphase", "export-profile", "--phase", "stress"]).is_err());
        let cli = parse(&["loadphase", "export-profile", "--phase", "stress", "--out", "s.yaml"]);
        match cli.command {
            Command::ExportProfile(args) => {
                assert_eq!(args.phase, Phase::Stress);
                assert_eq!(args.out, PathBuf::from("s.yaml"));
            }
            other => panic!("expected export-profile, got {other:?}"),
        }
    }
}
