//! `dts-util uninstall`: remove the service and binary, keep models.

use anyhow::{Context, Result};
use colored::Colorize;

use dts_installer::{Installer, Launchctl, TerminalPrompt};

use super::Host;

pub fn run() -> Result<()> {
    let host = Host::detect()?;
    let prompt = TerminalPrompt::new(true);
    let installer = Installer::new(
        host.layout.clone(),
        &Launchctl,
        &host.probe,
        &host.releases,
        &prompt,
    );

    let report = installer
        .uninstall()
        .context("failed to uninstall gRPCServerCLI")?;

    if report.nothing_found() {
        println!("No gRPCServerCLI installation found.");
    }
    for unit in &report.removed_units {
        println!("removed service: {}", unit.display());
    }
    if report.stopped_processes > 0 {
        println!("stopped {} server process(es)", report.stopped_processes);
    }
    for binary in &report.removed_binaries {
        println!("removed binary:  {}", binary.display());
    }
    for warning in &report.warnings {
        println!("{} {warning}", "warning:".yellow().bold());
    }
    if report.port_still_in_use {
        println!(
            "{} port {} is still in use; check with: lsof -i :{}",
            "warning:".yellow().bold(),
            dts_grpc::DEFAULT_PORT,
            dts_grpc::DEFAULT_PORT
        );
    }

    println!("Model files were left in place.");
    Ok(())
}
