//! `dts-util install`: download, register and verify the server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use dts_installer::{
    ConfigError, ConfigSources, InstallConfig, InstallError, InstallLayout, InstallOptions,
    InstallReport, Installer, Launchctl, PathSetup, TerminalPrompt,
};

use super::{home_dir, Host};

/// Arguments for `dts-util install`. Unset options keep the server's defaults.
#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Models directory (default: $DRAW_THINGS_MODEL_PATH, then the Draw Things app container).
    #[arg(short, long, value_name = "MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    /// Assume the default answer to every question.
    #[arg(short, long)]
    pub quiet: bool,

    /// Server name advertised to clients (default: machine hostname).
    #[arg(short, long)]
    pub name: Option<String>,

    /// Port to listen on [default: 7859].
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind [default: 0.0.0.0].
    #[arg(short, long)]
    pub address: Option<String>,

    /// GPU index [default: 0].
    #[arg(short, long)]
    pub gpu: Option<u32>,

    /// Datadog API key for server monitoring.
    #[arg(short = 'd', long)]
    pub datadog_api_key: Option<String>,

    /// Shared secret clients must present.
    #[arg(short, long)]
    pub shared_secret: Option<String>,

    /// Serve without TLS.
    #[arg(long)]
    pub no_tls: bool,

    /// Disable response compression.
    #[arg(long)]
    pub no_response_compression: bool,

    /// Enable the model browser.
    #[arg(long)]
    pub model_browser: bool,

    /// Disable FlashAttention.
    #[arg(long)]
    pub no_flash_attention: bool,

    /// Verbose server logging.
    #[arg(long)]
    pub debug: bool,

    /// Proxy-join descriptor, e.g. '{"host":"proxy.local","port":7859}'.
    #[arg(long, value_name = "JSON")]
    pub join: Option<String>,
}

impl InstallArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let prompt = TerminalPrompt::new(self.quiet);

        let sources = ConfigSources::from_env(&home);
        let config = match InstallConfig::resolve(self.into_options(), &sources, &prompt) {
            Ok(config) => config,
            Err(ConfigError::Cancelled) => {
                println!("Installation cancelled.");
                return Ok(());
            }
            Err(err) => return Err(err).context("invalid install options"),
        };

        let host = Host::detect()?;
        let installer = Installer::new(
            host.layout.clone(),
            &Launchctl,
            &host.probe,
            &host.releases,
            &prompt,
        );

        println!("Installing gRPCServerCLI on port {}...", config.port);
        print_settings(&config);

        match installer.install(&config) {
            Ok(report) => {
                print_report(&report);
                Ok(())
            }
            Err(err) if matches!(err.root(), InstallError::Cancelled) => {
                println!("Installation cancelled.");
                Ok(())
            }
            Err(err) => {
                if matches!(err.root(), InstallError::ServiceNotResponding { .. }) {
                    print_troubleshooting(&config, installer.layout());
                }
                Err(err).context("installation failed")
            }
        }
    }

    fn into_options(self) -> InstallOptions {
        InstallOptions {
            model_path: self.model_path,
            quiet: self.quiet,
            name: self.name,
            port: self.port,
            address: self.address,
            gpu: self.gpu,
            datadog_api_key: self.datadog_api_key,
            shared_secret: self.shared_secret,
            no_tls: self.no_tls,
            no_response_compression: self.no_response_compression,
            model_browser: self.model_browser,
            no_flash_attention: self.no_flash_attention,
            debug: self.debug,
            join: self.join,
        }
    }
}

#[derive(Tabled)]
struct SettingRow {
    #[tabled(rename = "option")]
    option: String,
    #[tabled(rename = "value")]
    value: String,
}

fn print_settings(config: &InstallConfig) {
    println!("Models directory: {}", config.model_path.display());

    let rows: Vec<SettingRow> = config
        .non_default_settings()
        .into_iter()
        .map(|(option, value)| SettingRow {
            option: option.to_string(),
            value,
        })
        .collect();
    if rows.is_empty() {
        return;
    }

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn print_report(report: &InstallReport) {
    if let Some(replaced) = &report.replaced {
        println!(
            "Replaced previous installation ({} service(s), {} binary(ies)).",
            replaced.units.len(),
            replaced.binaries.len()
        );
    }
    for warning in &report.warnings {
        println!("{} {warning}", "warning:".yellow().bold());
    }

    match &report.path_setup {
        Some(PathSetup::AddedTo(rc)) => {
            println!("Added the binary directory to PATH in {}", rc.display());
            println!("Restart your terminal or run:");
            println!("    source {}", rc.display());
        }
        Some(PathSetup::Manual(line)) => {
            println!("To put the binary on your PATH, add this line to your shell configuration:");
            println!("    {line}");
        }
        None => {}
    }

    println!();
    println!("{}", "Installation completed successfully!".green().bold());
    println!("Models directory: {}", report.model_path.display());
    println!("Binary location:  {}", report.binary.display());
    println!("Service unit:     {}", report.unit.display());
    println!();
    println!(
        "The gRPCServerCLI service is running on port {} and starts automatically on login.",
        report.port
    );
    println!("Manage it with:");
    println!("    dts-util restart");
    println!("    dts-util uninstall");
}

fn print_troubleshooting(config: &InstallConfig, layout: &InstallLayout) {
    println!();
    println!(
        "{}",
        "The service was registered but the server is not answering.".yellow()
    );
    println!("Try these troubleshooting steps:");
    for line in troubleshooting_steps(config, layout) {
        println!("{line}");
    }
}

/// The server's own output goes to the unit's log files, not the system log.
fn troubleshooting_steps(config: &InstallConfig, layout: &InstallLayout) -> Vec<String> {
    vec![
        "1. Check the server logs:".to_string(),
        format!("    tail -n 50 {}", layout.stderr_log().display()),
        format!("    tail -n 50 {}", layout.stdout_log().display()),
        "2. Restart the service:".to_string(),
        "    dts-util restart".to_string(),
        "3. Check that the models directory is accessible:".to_string(),
        format!("    ls {}", config.model_path.display()),
    ]
}
