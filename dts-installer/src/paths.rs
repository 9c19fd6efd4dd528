use std::path::{Path, PathBuf};

pub const SERVICE_LABEL: &str = "com.drawthings.grpcserver";
pub const BINARY_NAME: &str = "gRPCServerCLI";
pub const MODEL_PATH_ENV: &str = "DRAW_THINGS_MODEL_PATH";
pub const PREFERRED_BIN_DIR: &str = "/usr/local/bin";

pub const SERVER_STDOUT_LOG: &str = "stdout.log";
pub const SERVER_STDERR_LOG: &str = "stderr.log";

pub fn launch_agents_dir(home: &Path) -> PathBuf {
    home.join("Library").join("LaunchAgents")
}

pub fn local_bin_dir(home: &Path) -> PathBuf {
    home.join(".local").join("bin")
}

pub fn logs_dir(home: &Path) -> PathBuf {
    home.join("Library").join("Logs").join(BINARY_NAME)
}

/// Models directory of the Draw Things app container.
pub fn default_model_path(home: &Path) -> PathBuf {
    home.join("Library")
        .join("Containers")
        .join("com.liuliu.draw-things")
        .join("Data")
        .join("Documents")
        .join("Models")
}

/// Every location the installer reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    pub home: PathBuf,
    pub preferred_bin_dir: PathBuf,
    pub local_bin_dir: PathBuf,
    pub agents_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl InstallLayout {
    /// Standard layout for a user home: system-wide binary with a user-local fallback.
    pub fn for_home(home: &Path) -> Self {
        Self {
            home: home.to_path_buf(),
            preferred_bin_dir: PathBuf::from(PREFERRED_BIN_DIR),
            local_bin_dir: local_bin_dir(home),
            agents_dir: launch_agents_dir(home),
            logs_dir: logs_dir(home),
        }
    }

    pub fn unit_path(&self) -> PathBuf {
        self.agents_dir.join(format!("{SERVICE_LABEL}.plist"))
    }

    /// Candidate binary locations, preferred first.
    pub fn binary_candidates(&self) -> [PathBuf; 2] {
        [
            self.preferred_bin_dir.join(BINARY_NAME),
            self.local_bin_dir.join(BINARY_NAME),
        ]
    }

    pub fn stdout_log(&self) -> PathBuf {
        self.logs_dir.join(SERVER_STDOUT_LOG)
    }

    pub fn stderr_log(&self) -> PathBuf {
        self.logs_dir.join(SERVER_STDERR_LOG)
    }
}
