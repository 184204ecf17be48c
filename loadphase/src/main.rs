mod cli;
mod exit_codes;
mod export_profile;
mod lint;
mod logging;
mod output;
mod profile_yaml;
mod run;
mod run_error;
mod run_support;

use clap::Parser;
use mimalloc::MiMalloc;

use crate::exit_codes::ExitCode;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() {
    let cli = match cli::Cli::try_parse() {
        Ok(v) => v,
        Err(err) => {
            use clap::error::ErrorKind;
            let _ = err.print();
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::Success.as_i32(),
                _ => ExitCode::InvalidInput.as_i32(),
            };
            std::process::exit(code);
        }
    };

    logging::init(cli.verbose);

    let result = match cli.command {
        cli::Command::Run(args) => run::run(args).await,
        cli::Command::Lint(args) => lint::lint(args).await,
        cli::Command::Phases => Ok(export_profile::list_phases()),
        cli::Command::ExportProfile(args) => export_profile::export_profile(args).await,
    };

    let code = match result {
        Ok(code) => code.as_i32(),
        Err(err) => {
            eprintln!("{err}");
            err.exit_code().as_i32()
        }
    };

    std::process::exit(code);
}
