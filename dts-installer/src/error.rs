use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Install steps, in execution order. Named in every step failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStep {
    Existing,
    PortCheck,
    Resolve,
    Download,
    Place,
    WriteUnit,
    Start,
    Verify,
}

impl fmt::Display for InstallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Existing => "remove existing installation",
            Self::PortCheck => "check port",
            Self::Resolve => "resolve latest release",
            Self::Download => "download binary",
            Self::Place => "install binary",
            Self::WriteUnit => "write service unit",
            Self::Start => "start service",
            Self::Verify => "verify server",
        };
        f.write_str(label)
    }
}

/// Invalid `--join` descriptor.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("--join value must be valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("join configuration must be a JSON object")]
    NotAnObject,

    #[error("join configuration must include '{0}'")]
    MissingField(&'static str),

    #[error("join host must be a non-empty string")]
    EmptyHost,

    #[error("join port must be an integer between 1 and 65535, got {0}")]
    InvalidPort(String),

    #[error("join servers must be a list")]
    ServersNotAList,

    #[error("join server #{index} must be an object with 'address' and 'port'")]
    InvalidServer { index: usize },

    #[error("join server #{index}: address must be a non-empty string")]
    EmptyServerAddress { index: usize },

    #[error("join server #{index}: port must be an integer between 1 and 65535, got {value}")]
    InvalidServerPort { index: usize, value: String },

    #[error("join server #{index}: priority must be 1 or 2, got {value}")]
    InvalidServerPriority { index: usize, value: String },
}

/// Bad or missing install option. Raised before anything is touched on disk.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "no model directory: pass --model-path or set DRAW_THINGS_MODEL_PATH \
         (default {} does not exist)",
        .default.display()
    )]
    MissingModelPath { default: PathBuf },

    #[error("invalid --join configuration: {0}")]
    InvalidJoin(#[from] JoinError),

    #[error("installation cancelled")]
    Cancelled,
}

/// Error surface for install, uninstall, restart and their capabilities.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("{step} failed: {source}")]
    Step {
        step: InstallStep,
        #[source]
        source: Box<InstallError>,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("port {port} is already in use{}", owner_suffix(.owner))]
    PortInUse { port: u16, owner: Option<String> },

    #[error("installation cancelled")]
    Cancelled,

    #[error("service not installed ({} is missing)", .unit.display())]
    NotInstalled { unit: PathBuf },

    #[error("launchd error: {0}")]
    Supervisor(String),

    #[error("download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("invalid service unit at {}: {source}", .path.display())]
    Unit {
        path: PathBuf,
        #[source]
        source: plist::Error,
    },

    #[error(
        "server did not answer on port {port} within {}s; the service is still registered at {}. \
         Check {} or run `dts-util restart`",
        .waited.as_secs(),
        .unit.display(),
        .log.display()
    )]
    ServiceNotResponding {
        port: u16,
        waited: Duration,
        unit: PathBuf,
        log: PathBuf,
    },
}

impl InstallError {
    /// Tag this error with the step it aborted.
    pub fn at(self, step: InstallStep) -> Self {
        Self::Step {
            step,
            source: Box::new(self),
        }
    }

    /// The step that failed, if the error went through [`InstallError::at`].
    pub fn step(&self) -> Option<InstallStep> {
        match self {
            Self::Step { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// The error with any step tagging removed.
    pub fn root(&self) -> &InstallError {
        match self {
            Self::Step { source, .. } => source.root(),
            other => other,
        }
    }
}

fn owner_suffix(owner: &Option<String>) -> String {
    match owner {
        Some(owner) => format!("; process using the port:\n{owner}"),
        None => String::new(),
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> InstallError {
    InstallError::Io {
        path: path.into(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_tag_names_the_step_and_keeps_the_cause() {
        let err = InstallError::PortInUse {
            port: 7859,
            owner: Some("gRPCServe 4242 user LISTEN".to_string()),
        }
        .at(InstallStep::PortCheck);

        assert_eq!(err.step(), Some(InstallStep::PortCheck));
        assert!(matches!(err.root(), InstallError::PortInUse { port: 7859, .. }));
        let msg = err.to_string();
        assert!(msg.starts_with("check port failed: port 7859 is already in use"));
        assert!(msg.contains("gRPCServe 4242"));
    }
}
