//! `dts-util restart`: reload the installed LaunchAgent.

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

    let unit = installer
        .restart()
        .context("failed to restart gRPCServerCLI service")?;
    println!("{} {}", "restarted".green(), unit.display());
    Ok(())
}
