//! Install configuration resolution.
//!
//! Precedence, lowest to highest: built-in defaults, environment
//! (`DRAW_THINGS_MODEL_PATH`), explicit flags. [`InstallConfig::resolve`] is
//! the only constructor, so a config that exists is fully resolved.

use std::path::{Path, PathBuf};
use std::process::Command;

use dts_grpc::{ConnectionConfig, DEFAULT_PORT};

use crate::error::ConfigError;
use crate::join::JoinConfig;
use crate::paths::{default_model_path, MODEL_PATH_ENV};
use crate::prompt::Prompt;

pub const DEFAULT_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_GPU: u32 = 0;

const MODEL_PATH_ATTEMPTS: usize = 3;

/// Raw install flags; `None` means "not given on the command line".
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub model_path: Option<PathBuf>,
    pub quiet: bool,
    pub name: Option<String>,
    pub port: Option<u16>,
    pub address: Option<String>,
    pub gpu: Option<u32>,
    pub datadog_api_key: Option<String>,
    pub shared_secret: Option<String>,
    pub no_tls: bool,
    pub no_response_compression: bool,
    pub model_browser: bool,
    pub no_flash_attention: bool,
    pub debug: bool,
    pub join: Option<String>,
}

/// Ambient inputs consulted when a flag is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSources {
    pub env_model_path: Option<PathBuf>,
    pub default_model_path: PathBuf,
    pub hostname: String,
}

impl ConfigSources {
    pub fn from_env(home: &Path) -> Self {
        Self {
            env_model_path: std::env::var_os(MODEL_PATH_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            default_model_path: default_model_path(home),
            hostname: machine_name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallConfig {
    pub model_path: PathBuf,
    pub name: String,
    /// Name the server binary picks on its own; `--name` is only passed when
    /// `name` differs from it.
    pub default_name: String,
    pub port: u16,
    pub address: String,
    pub gpu: u32,
    pub datadog_api_key: Option<String>,
    pub shared_secret: Option<String>,
    pub tls: bool,
    pub response_compression: bool,
    pub model_browser: bool,
    pub flash_attention: bool,
    pub debug: bool,
    pub join: Option<JoinConfig>,
    pub quiet: bool,
}

impl InstallConfig {
    pub fn resolve(
        options: InstallOptions,
        sources: &ConfigSources,
        prompt: &dyn Prompt,
    ) -> Result<Self, ConfigError> {
        let join = options.join.as_deref().map(JoinConfig::parse).transpose()?;

        let model_path = match options.model_path.or_else(|| sources.env_model_path.clone()) {
            Some(path) => path,
            None => default_or_prompted_model_path(&sources.default_model_path, prompt)?,
        };

        if options.no_tls && !options.quiet {
            prompt.notify("WARNING: --no-tls disables encryption. Use only in trusted networks!");
            if !prompt.confirm("Are you sure you want to continue?", false) {
                return Err(ConfigError::Cancelled);
            }
        }

        Ok(Self {
            model_path,
            name: non_empty(options.name).unwrap_or_else(|| sources.hostname.clone()),
            default_name: sources.hostname.clone(),
            port: options.port.unwrap_or(DEFAULT_PORT),
            address: non_empty(options.address).unwrap_or_else(|| DEFAULT_ADDRESS.to_string()),
            gpu: options.gpu.unwrap_or(DEFAULT_GPU),
            datadog_api_key: non_empty(options.datadog_api_key),
            shared_secret: non_empty(options.shared_secret),
            tls: !options.no_tls,
            response_compression: !options.no_response_compression,
            model_browser: options.model_browser,
            flash_attention: !options.no_flash_attention,
            debug: options.debug,
            join,
            quiet: options.quiet,
        })
    }

    /// How a local client reaches the server this config installs.
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: dts_grpc::DEFAULT_HOST.to_string(),
            port: self.port,
            use_tls: self.tls,
            shared_secret: self.shared_secret.clone(),
        }
    }

    /// Settings that differ from the server defaults, secrets masked.
    pub fn non_default_settings(&self) -> Vec<(&'static str, String)> {
        let mut settings = Vec::new();
        if self.name != self.default_name {
            settings.push(("name", self.name.clone()));
        }
        if self.port != DEFAULT_PORT {
            settings.push(("port", self.port.to_string()));
        }
        if self.address != DEFAULT_ADDRESS {
            settings.push(("address", self.address.clone()));
        }
        if self.gpu != DEFAULT_GPU {
            settings.push(("gpu", self.gpu.to_string()));
        }
        if self.datadog_api_key.is_some() {
            settings.push(("datadog api key", "********".to_string()));
        }
        if self.shared_secret.is_some() {
            settings.push(("shared secret", "********".to_string()));
        }
        if !self.tls {
            settings.push(("tls", "disabled".to_string()));
        }
        if !self.response_compression {
            settings.push(("response compression", "disabled".to_string()));
        }
        if self.model_browser {
            settings.push(("model browser", "enabled".to_string()));
        }
        if !self.flash_attention {
            settings.push(("flash attention", "disabled".to_string()));
        }
        if self.debug {
            settings.push(("debug", "enabled".to_string()));
        }
        if let Some(join) = &self.join {
            settings.push(("join", format!("{}:{}", join.host, join.port)));
        }
        settings
    }
}

fn default_or_prompted_model_path(
    default: &Path,
    prompt: &dyn Prompt,
) -> Result<PathBuf, ConfigError> {
    if default.exists() {
        return Ok(default.to_path_buf());
    }

    prompt.notify(&format!("Default model path not found: {}", default.display()));
    for _ in 0..MODEL_PATH_ATTEMPTS {
        let Some(answer) = prompt.ask("Please enter path for models (or 'q' to quit): ") else {
            break;
        };
        if answer.eq_ignore_ascii_case("q") {
            return Err(ConfigError::Cancelled);
        }
        let path = PathBuf::from(answer);
        if path.exists() {
            return Ok(path);
        }
        prompt.notify("Path does not exist. Please try again.");
    }

    Err(ConfigError::MissingModelPath {
        default: default.to_path_buf(),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Machine hostname with a trailing `.local` removed.
pub fn clean_hostname(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed.strip_suffix(".local").unwrap_or(trimmed).to_string()
}

fn machine_name() -> String {
    let from_command = Command::new("hostname")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).into_owned());

    match from_command.or_else(|| std::env::var("HOSTNAME").ok()) {
        Some(raw) if !raw.trim().is_empty() => clean_hostname(&raw),
        _ => "localhost".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_loses_local_suffix() {
        assert_eq!(clean_hostname("studio.local\n"), "studio");
        assert_eq!(clean_hostname("gpu-box"), "gpu-box");
        assert_eq!(clean_hostname("local"), "local");
    }
}
