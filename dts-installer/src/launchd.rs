use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::config::{InstallConfig, DEFAULT_ADDRESS, DEFAULT_GPU};
use crate::error::{io_err, InstallError};
use crate::paths::{InstallLayout, BINARY_NAME, SERVICE_LABEL};
use crate::supervisor::{ServiceStatus, Supervisor};

/// launchd LaunchAgent property list for the server binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceUnit {
    pub label: String,
    pub program_arguments: Vec<String>,
    pub working_directory: PathBuf,
    pub run_at_load: bool,
    pub keep_alive: bool,
    pub standard_out_path: PathBuf,
    pub standard_error_path: PathBuf,
}

impl ServiceUnit {
    pub fn for_install(config: &InstallConfig, binary: &Path, layout: &InstallLayout) -> Self {
        Self {
            label: SERVICE_LABEL.to_string(),
            program_arguments: program_arguments(config, binary),
            working_directory: layout.home.clone(),
            run_at_load: true,
            keep_alive: true,
            standard_out_path: layout.stdout_log(),
            standard_error_path: layout.stderr_log(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, InstallError> {
        plist::from_file(path).map_err(|source| InstallError::Unit {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Render as an XML property list.
    pub fn render(&self) -> Result<String, plist::Error> {
        let mut xml = Vec::new();
        plist::to_writer_xml(&mut xml, self)?;
        Ok(String::from_utf8_lossy(&xml).into_owned())
    }

    /// Write to `path` through a temp file + rename, creating the log directory.
    pub fn write_to(&self, path: &Path) -> Result<(), InstallError> {
        let xml = self.render().map_err(|source| InstallError::Unit {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        if let Some(logs) = self.standard_out_path.parent() {
            fs::create_dir_all(logs).map_err(|e| io_err(logs, e))?;
        }

        let tmp = path.with_extension("plist.tmp");
        fs::write(&tmp, xml).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(path, e));
        }
        tracing::info!(path = %path.display(), "wrote service unit");
        Ok(())
    }

    /// The installed binary this unit launches, if it is ours.
    pub fn binary_path(&self) -> Option<PathBuf> {
        self.program_arguments
            .first()
            .map(PathBuf::from)
            .filter(|p| p.file_name().is_some_and(|name| name == BINARY_NAME))
    }
}

/// Argument vector for the server binary: binary, model path, then only the
/// options that differ from the binary's own defaults.
pub fn program_arguments(config: &InstallConfig, binary: &Path) -> Vec<String> {
    let mut args = vec![
        binary.display().to_string(),
        config.model_path.display().to_string(),
    ];

    if config.name != config.default_name {
        args.extend(["--name".to_string(), config.name.clone()]);
    }
    if config.port != dts_grpc::DEFAULT_PORT {
        args.extend(["--port".to_string(), config.port.to_string()]);
    }
    if config.address != DEFAULT_ADDRESS {
        args.extend(["--address".to_string(), config.address.clone()]);
    }
    if config.gpu != DEFAULT_GPU {
        args.extend(["--gpu".to_string(), config.gpu.to_string()]);
    }
    if let Some(key) = &config.datadog_api_key {
        args.extend(["--datadog-api-key".to_string(), key.clone()]);
    }
    if let Some(secret) = &config.shared_secret {
        args.extend(["--shared-secret".to_string(), secret.clone()]);
    }
    if !config.tls {
        args.push("--no-tls".to_string());
    }
    if !config.response_compression {
        args.push("--no-response-compression".to_string());
    }
    if config.model_browser {
        args.push("--model-browser".to_string());
    }
    if !config.flash_attention {
        args.push("--no-flash-attention".to_string());
    }
    if config.debug {
        args.push("--debug".to_string());
    }
    if let Some(join) = &config.join {
        args.extend(["--join".to_string(), join.as_str().to_string()]);
    }

    args
}

/// [`Supervisor`] backed by `launchctl` in the current user's GUI domain.
///
/// The service label is read from each unit file, so units written by other
/// installers can be stopped too.
#[derive(Debug, Clone, Copy, Default)]
pub struct Launchctl;

impl Supervisor for Launchctl {
    fn start(&self, unit: &Path) -> Result<(), InstallError> {
        ensure_macos()?;

        let domain = launchctl_domain()?;
        let service = format!("{domain}/{}", unit_label(unit));

        let _ = run_launchctl(vec!["bootout".to_string(), service.clone()], true);
        run_launchctl(
            vec!["bootstrap".to_string(), domain, unit.display().to_string()],
            false,
        )?;
        run_launchctl(
            vec!["kickstart".to_string(), "-k".to_string(), service],
            false,
        )
    }

    fn stop(&self, unit: &Path) -> Result<(), InstallError> {
        ensure_macos()?;

        if self.status(unit) == ServiceStatus::NotLoaded {
            return Ok(());
        }
        let domain = launchctl_domain()?;
        run_launchctl(
            vec!["bootout".to_string(), format!("{domain}/{}", unit_label(unit))],
            false,
        )
    }

    fn status(&self, unit: &Path) -> ServiceStatus {
        let Ok(output) = Command::new("launchctl")
            .args(["list", unit_label(unit).as_str()])
            .output()
        else {
            return ServiceStatus::NotLoaded;
        };
        if !output.status.success() {
            return ServiceStatus::NotLoaded;
        }
        match parse_list_pid(&String::from_utf8_lossy(&output.stdout)) {
            Some(pid) => ServiceStatus::Running { pid },
            None => ServiceStatus::Loaded,
        }
    }
}

/// `Label` of the unit at `path`, or its file stem when unreadable.
pub fn unit_label(path: &Path) -> String {
    plist::Value::from_file(path)
        .ok()
        .and_then(|value| {
            value
                .as_dictionary()
                .and_then(|dict| dict.get("Label"))
                .and_then(plist::Value::as_string)
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| SERVICE_LABEL.to_string())
        })
}

/// Extract `"PID" = 123;` from `launchctl list <label>` output.
fn parse_list_pid(output: &str) -> Option<u32> {
    output.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("\"PID\" = ")?;
        rest.trim_end_matches(';').trim().parse().ok()
    })
}

#[cfg(target_os = "macos")]
fn ensure_macos() -> Result<(), InstallError> {
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn ensure_macos() -> Result<(), InstallError> {
    Err(InstallError::Supervisor(
        "launchd management is only supported on macOS".to_string(),
    ))
}

fn run_launchctl(args: Vec<String>, ignore_failure: bool) -> Result<(), InstallError> {
    tracing::debug!(args = ?args, "launchctl");
    let output = Command::new("launchctl")
        .args(args.iter().map(String::as_str))
        .output()
        .map_err(|e| io_err("launchctl", e))?;

    if output.status.success() || ignore_failure {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Err(InstallError::Supervisor(format!(
        "launchctl {} failed (status {}): {} {}",
        args.first().map(String::as_str).unwrap_or_default(),
        output.status,
        stdout,
        stderr
    )))
}

fn launchctl_domain() -> Result<String, InstallError> {
    let output = Command::new("id")
        .arg("-u")
        .output()
        .map_err(|e| io_err("id -u", e))?;
    if !output.status.success() {
        return Err(InstallError::Supervisor(format!(
            "failed to resolve current uid (status {})",
            output.status
        )));
    }

    let uid = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if uid.is_empty() {
        return Err(InstallError::Supervisor(
            "current uid from `id -u` was empty".to_string(),
        ));
    }
    Ok(format!("gui/{uid}"))
}
