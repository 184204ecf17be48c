use strum::IntoEnumIterator as _;

use crate::cli::ExportProfileArgs;
use crate::exit_codes::ExitCode;
use crate::profile_yaml;
use crate::run_error::RunError;

pub async fn export_profile(args: ExportProfileArgs) -> Result<ExitCode, RunError> {
    profile_yaml::write_yaml_file(&args.out, &args.phase.spec())
        .await
        .map_err(|e| RunError::RuntimeError(e.context("failed to write profile YAML")))?;

    println!("wrote {} to {}", args.phase, args.out.display());
    Ok(ExitCode::Success)
}

pub fn list_phases() -> ExitCode {
    for phase in loadphase_core::Phase::iter() {
        println!("{:<10} {}", phase.to_string(), phase.description());
    }
    ExitCode::Success
}
