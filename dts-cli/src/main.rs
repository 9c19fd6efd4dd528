//! dts-util: install and manage the Draw Things gRPCServerCLI service.
//!
//! # Usage
//!
//! ```text
//! dts-util install [-m MODEL_PATH] [-q] [gRPCServerCLI options]
//! dts-util uninstall
//! dts-util restart
//! dts-util test [-p PORT] [--host HOST] [--echo]
//! ```

mod commands;

use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;

use commands::{install::InstallArgs, test::TestArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "dts-util",
    version,
    about = "Install and manage the Draw Things gRPCServerCLI as a launchd service",
    long_about = None,
)]
struct Cli {
    /// Log debug detail to stderr (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download gRPCServerCLI and register it as a LaunchAgent.
    Install(InstallArgs),

    /// Stop the service and remove the binary and LaunchAgent. Models are kept.
    Uninstall,

    /// Reload the installed LaunchAgent without changing its configuration.
    Restart,

    /// Check whether a server answers on the given port.
    Test(TestArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    init_tracing(cli.verbose);

    let Some(command) = cli.command else {
        let _ = Cli::command().print_help();
        println!();
        return ExitCode::SUCCESS;
    };

    let result = match command {
        Commands::Install(args) => args.run(),
        Commands::Uninstall => commands::uninstall::run(),
        Commands::Restart => commands::restart::run(),
        Commands::Test(args) => args.run(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
