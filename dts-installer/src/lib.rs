//! Installer and service-lifecycle manager for the Draw Things gRPCServerCLI.
//!
//! Resolves an [`InstallConfig`], fetches the server binary, registers it as a
//! launchd LaunchAgent and verifies it answers. The OS-facing parts sit behind
//! [`Supervisor`], [`HostProbe`], [`ReleaseSource`] and [`Prompt`].

pub mod config;
pub mod error;
pub mod installer;
pub mod join;
pub mod launchd;
pub mod paths;
pub mod probe;
pub mod prompt;
pub mod release;
pub mod supervisor;

pub use config::{ConfigSources, InstallConfig, InstallOptions, DEFAULT_ADDRESS, DEFAULT_GPU};
pub use error::{ConfigError, InstallError, InstallStep, JoinError};
pub use installer::{
    ExistingInstall, InstallReport, Installer, PathSetup, PollPolicy, ShellEnv, UninstallReport,
};
pub use join::{JoinConfig, JoinServer};
pub use launchd::{program_arguments, Launchctl, ServiceUnit};
pub use paths::{InstallLayout, BINARY_NAME, MODEL_PATH_ENV, SERVICE_LABEL};
pub use probe::{HostProbe, SystemProbe};
pub use prompt::{Prompt, TerminalPrompt};
pub use release::{GithubReleases, ReleaseSource, FALLBACK_VERSION};
pub use supervisor::{ServiceStatus, Supervisor};
