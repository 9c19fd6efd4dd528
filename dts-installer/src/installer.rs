//! Service lifecycle: install, uninstall, restart, test.
//!
//! [`Installer`] owns no global state. Every location comes from its
//! [`InstallLayout`] and every side effect outside the filesystem goes through
//! one of the injected capabilities.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::InstallConfig;
use crate::error::{io_err, InstallError, InstallStep};
use crate::launchd::ServiceUnit;
use crate::paths::{InstallLayout, BINARY_NAME};
use crate::probe::HostProbe;
use crate::prompt::Prompt;
use crate::release::ReleaseSource;
use crate::supervisor::Supervisor;

const PATH_MARKER: &str = "# Added by Draw Things installer";

/// Timing of the post-start poll and of service reloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
    /// Pause between stopping and starting a service.
    pub settle: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
            settle: Duration::from_secs(1),
        }
    }
}

impl PollPolicy {
    /// No waiting at all; one poll attempt.
    pub fn immediate() -> Self {
        Self {
            interval: Duration::ZERO,
            timeout: Duration::ZERO,
            settle: Duration::ZERO,
        }
    }
}

/// Shell environment consulted when the binary lands outside `PATH`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellEnv {
    pub path: Option<String>,
    pub shell: Option<String>,
}

impl ShellEnv {
    pub fn from_env() -> Self {
        Self {
            path: std::env::var("PATH").ok(),
            shell: std::env::var("SHELL").ok(),
        }
    }

    fn contains(&self, dir: &Path) -> bool {
        self.path
            .as_deref()
            .is_some_and(|path| std::env::split_paths(path).any(|entry| entry == dir))
    }

    /// zsh is the macOS default login shell.
    fn rc_file(&self, home: &Path) -> PathBuf {
        let shell = self.shell.as_deref().unwrap_or("/bin/zsh");
        if shell.contains("zsh") {
            home.join(".zshrc")
        } else {
            home.join(".bash_profile")
        }
    }
}

/// Prior installation found on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistingInstall {
    pub units: Vec<PathBuf>,
    pub binaries: Vec<PathBuf>,
    pub processes: Vec<String>,
}

impl ExistingInstall {
    pub fn is_empty(&self) -> bool {
        self.units.is_empty() && self.binaries.is_empty() && self.processes.is_empty()
    }
}

/// What became of `~/.local/bin` not being on `PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSetup {
    AddedTo(PathBuf),
    /// Line the user has to add themselves.
    Manual(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub binary: PathBuf,
    pub unit: PathBuf,
    pub model_path: PathBuf,
    pub port: u16,
    pub replaced: Option<ExistingInstall>,
    pub path_setup: Option<PathSetup>,
    /// Leftovers of the replaced installation that could not be removed.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UninstallReport {
    pub removed_units: Vec<PathBuf>,
    pub removed_binaries: Vec<PathBuf>,
    pub stopped_processes: usize,
    pub warnings: Vec<String>,
    /// Whether the default port was still held after cleanup.
    pub port_still_in_use: bool,
}

impl UninstallReport {
    pub fn nothing_found(&self) -> bool {
        self.removed_units.is_empty()
            && self.removed_binaries.is_empty()
            && self.stopped_processes == 0
    }
}

struct Placement {
    binary: PathBuf,
    path_setup: Option<PathSetup>,
}

pub struct Installer<'a> {
    layout: InstallLayout,
    supervisor: &'a dyn Supervisor,
    probe: &'a dyn HostProbe,
    releases: &'a dyn ReleaseSource,
    prompt: &'a dyn Prompt,
    policy: PollPolicy,
    shell: ShellEnv,
}

impl<'a> Installer<'a> {
    pub fn new(
        layout: InstallLayout,
        supervisor: &'a dyn Supervisor,
        probe: &'a dyn HostProbe,
        releases: &'a dyn ReleaseSource,
        prompt: &'a dyn Prompt,
    ) -> Self {
        Self {
            layout,
            supervisor,
            probe,
            releases,
            prompt,
            policy: PollPolicy::default(),
            shell: ShellEnv::from_env(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_shell_env(mut self, shell: ShellEnv) -> Self {
        self.shell = shell;
        self
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    /// Clean install. Each failure is tagged with the [`InstallStep`] it aborted.
    ///
    /// Nothing on disk changes until the port is known to be free or held by
    /// the installation about to be replaced.
    pub fn install(&self, config: &InstallConfig) -> Result<InstallReport, InstallError> {
        let existing = self.existing_installation();
        self.check_port(config.port, &existing)
            .map_err(|e| e.at(InstallStep::PortCheck))?;

        let (replaced, warnings) = if existing.is_empty() {
            (None, Vec::new())
        } else {
            let warnings = self
                .remove_existing(&existing)
                .map_err(|e| e.at(InstallStep::Existing))?;
            if self.probe.port_in_use(config.port) {
                let err = InstallError::PortInUse {
                    port: config.port,
                    owner: self.probe.port_owner(config.port),
                };
                return Err(err.at(InstallStep::PortCheck));
            }
            (Some(existing), warnings)
        };

        let url = self
            .releases
            .latest_download_url()
            .map_err(|e| e.at(InstallStep::Resolve))?;

        let staging = tempfile::tempdir()
            .map_err(|e| io_err(std::env::temp_dir(), e).at(InstallStep::Download))?;
        let downloaded = staging.path().join(BINARY_NAME);
        self.releases
            .download(&url, &downloaded)
            .map_err(|e| e.at(InstallStep::Download))?;

        let placement = self
            .place_binary(&downloaded)
            .map_err(|e| e.at(InstallStep::Place))?;

        let unit_path = self.layout.unit_path();
        ServiceUnit::for_install(config, &placement.binary, &self.layout)
            .write_to(&unit_path)
            .map_err(|e| e.at(InstallStep::WriteUnit))?;

        if let Err(err) = self.supervisor.start(&unit_path) {
            if let Err(cleanup) = fs::remove_file(&unit_path) {
                tracing::warn!(path = %unit_path.display(), error = %cleanup, "could not remove unit after failed start");
            }
            return Err(err.at(InstallStep::Start));
        }

        self.wait_until_responding(config.port, &unit_path)
            .map_err(|e| e.at(InstallStep::Verify))?;

        tracing::info!(port = config.port, binary = %placement.binary.display(), "install complete");
        Ok(InstallReport {
            binary: placement.binary,
            unit: unit_path,
            model_path: config.model_path.clone(),
            port: config.port,
            replaced,
            path_setup: placement.path_setup,
            warnings,
        })
    }

    /// Stop and remove every trace of the server except the model directory.
    pub fn uninstall(&self) -> Result<UninstallReport, InstallError> {
        let existing = self.existing_installation();
        let mut report = UninstallReport::default();

        let mut binaries = existing.binaries.clone();
        for unit in &existing.units {
            if let Some(binary) = ServiceUnit::load(unit).ok().and_then(|u| u.binary_path()) {
                binaries.push(binary);
            }
            if let Err(err) = self.supervisor.stop(unit) {
                report
                    .warnings
                    .push(format!("failed to stop {}: {err}", unit.display()));
            }
            fs::remove_file(unit).map_err(|e| io_err(unit, e))?;
            report.removed_units.push(unit.clone());
        }

        if !existing.processes.is_empty() {
            self.probe.stop_server_processes();
            report.stopped_processes = existing.processes.len();
        }

        binaries.sort();
        binaries.dedup();
        for binary in binaries.iter().filter(|b| b.exists()) {
            match fs::remove_file(binary) {
                Ok(()) => report.removed_binaries.push(binary.clone()),
                Err(err) => report.warnings.push(removal_warning(binary, &err)),
            }
        }

        report.port_still_in_use = self.probe.port_in_use(dts_grpc::DEFAULT_PORT);
        tracing::info!(
            units = report.removed_units.len(),
            binaries = report.removed_binaries.len(),
            "uninstall complete"
        );
        Ok(report)
    }

    /// Reload the registered unit without touching its configuration.
    pub fn restart(&self) -> Result<PathBuf, InstallError> {
        let unit = self.layout.unit_path();
        if !unit.exists() {
            return Err(InstallError::NotInstalled { unit });
        }

        self.supervisor.stop(&unit)?;
        thread::sleep(self.policy.settle);
        self.supervisor.start(&unit)?;
        tracing::info!(unit = %unit.display(), "service restarted");
        Ok(unit)
    }

    pub fn test(&self, port: u16) -> bool {
        self.probe.server_responds(port)
    }

    /// Units, binaries and processes left by this or an older installer.
    pub fn existing_installation(&self) -> ExistingInstall {
        let mut units: Vec<PathBuf> = fs::read_dir(&self.layout.agents_dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|entry| entry.path())
                    .filter(|path| is_server_unit(path))
                    .collect()
            })
            .unwrap_or_default();
        units.sort();

        let binaries = self
            .layout
            .binary_candidates()
            .into_iter()
            .filter(|path| path.exists())
            .collect();

        ExistingInstall {
            units,
            binaries,
            processes: self.probe.server_processes(),
        }
    }

    /// A busy port is only acceptable when `existing` is what holds it.
    fn check_port(&self, port: u16, existing: &ExistingInstall) -> Result<(), InstallError> {
        if !self.probe.port_in_use(port) {
            return Ok(());
        }
        let owner = self.probe.port_owner(port);
        if !existing.is_empty() && owner.as_deref().is_some_and(is_server_owner) {
            tracing::info!(port, "port is held by the existing installation");
            return Ok(());
        }
        Err(InstallError::PortInUse { port, owner })
    }

    /// Returns a warning for every binary that had to be left behind.
    fn remove_existing(&self, existing: &ExistingInstall) -> Result<Vec<String>, InstallError> {
        self.prompt.notify("Found existing gRPCServerCLI installation:");
        for unit in &existing.units {
            self.prompt.notify(&format!("  service: {}", unit.display()));
        }
        for binary in &existing.binaries {
            self.prompt.notify(&format!("  binary:  {}", binary.display()));
        }
        for process in &existing.processes {
            self.prompt.notify(&format!("  process: {process}"));
        }
        if !self
            .prompt
            .confirm("Would you like to remove the existing installation?", true)
        {
            return Err(InstallError::Cancelled);
        }

        for unit in &existing.units {
            if let Err(err) = self.supervisor.stop(unit) {
                tracing::warn!(unit = %unit.display(), error = %err, "failed to stop existing service");
            }
            fs::remove_file(unit).map_err(|e| io_err(unit, e))?;
        }
        if !existing.processes.is_empty() {
            self.probe.stop_server_processes();
        }

        let mut warnings = Vec::new();
        for binary in &existing.binaries {
            if let Err(err) = fs::remove_file(binary) {
                tracing::warn!(binary = %binary.display(), error = %err, "could not remove existing binary");
                warnings.push(removal_warning(binary, &err));
            }
        }
        thread::sleep(self.policy.settle);

        tracing::info!(
            units = existing.units.len(),
            binaries = existing.binaries.len() - warnings.len(),
            "removed existing installation"
        );
        Ok(warnings)
    }

    fn place_binary(&self, downloaded: &Path) -> Result<Placement, InstallError> {
        let preferred = &self.layout.preferred_bin_dir;
        let (dir, fell_back) = match ensure_writable(preferred) {
            Ok(()) => (preferred.clone(), false),
            Err(err) => {
                let local = &self.layout.local_bin_dir;
                tracing::warn!(
                    preferred = %preferred.display(),
                    error = %err,
                    "cannot write to preferred directory, using {}",
                    local.display()
                );
                fs::create_dir_all(local).map_err(|e| io_err(local, e))?;
                (local.clone(), true)
            }
        };

        let binary = dir.join(BINARY_NAME);
        move_into_place(downloaded, &binary)?;
        make_executable(&binary)?;

        let path_setup = if fell_back && !self.shell.contains(&dir) {
            Some(self.offer_path_update(&dir))
        } else {
            None
        };

        Ok(Placement { binary, path_setup })
    }

    fn offer_path_update(&self, dir: &Path) -> PathSetup {
        let export = export_line(&self.layout.home, dir);
        self.prompt
            .notify(&format!("NOTE: {} is not in your PATH.", dir.display()));
        if !self
            .prompt
            .confirm("Would you like to add it to your PATH?", false)
        {
            return PathSetup::Manual(export);
        }

        let rc = self.shell.rc_file(&self.layout.home);
        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&rc)
            .and_then(|mut file| writeln!(file, "\n{export}  {PATH_MARKER}"));
        match appended {
            Ok(()) => PathSetup::AddedTo(rc),
            Err(err) => {
                tracing::warn!(rc = %rc.display(), error = %err, "could not update shell rc file");
                PathSetup::Manual(export)
            }
        }
    }

    fn wait_until_responding(&self, port: u16, unit: &Path) -> Result<(), InstallError> {
        let deadline = Instant::now() + self.policy.timeout;
        loop {
            if self.probe.server_responds(port) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                break;
            }
            tracing::debug!(port, "server not answering yet");
            thread::sleep(self.policy.interval);
        }

        Err(InstallError::ServiceNotResponding {
            port,
            waited: self.policy.timeout,
            unit: unit.to_path_buf(),
            log: self.layout.stderr_log(),
        })
    }
}

/// Launch agent names used for the server by this and earlier installers.
fn is_server_unit(path: &Path) -> bool {
    if path.extension().and_then(|e| e.to_str()) != Some("plist") {
        return false;
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    (name.contains("drawthings") || name.contains("draw-things")) && name.contains("grpc")
}

/// `lsof` truncates the command column to nine characters.
const LSOF_COMMAND_WIDTH: usize = 9;

/// Whether an `lsof` listing names the server as a listener.
fn is_server_owner(owner: &str) -> bool {
    owner.lines().any(|line| {
        line.split_whitespace().next().is_some_and(|command| {
            command.len() >= LSOF_COMMAND_WIDTH.min(BINARY_NAME.len())
                && BINARY_NAME.starts_with(command)
        })
    })
}

fn removal_warning(binary: &Path, err: &io::Error) -> String {
    if err.kind() == io::ErrorKind::PermissionDenied {
        format!(
            "permission denied removing {}; run: sudo rm {}",
            binary.display(),
            binary.display()
        )
    } else {
        format!("failed to remove {}: {err}", binary.display())
    }
}

fn ensure_writable(dir: &Path) -> Result<(), InstallError> {
    fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    let probe = dir.join(".write_test");
    File::create(&probe).map_err(|e| io_err(&probe, e))?;
    fs::remove_file(&probe).map_err(|e| io_err(&probe, e))
}

/// Rename, or copy next to `dest` and rename when crossing devices.
fn move_into_place(src: &Path, dest: &Path) -> Result<(), InstallError> {
    if fs::rename(src, dest).is_ok() {
        return Ok(());
    }

    let partial = dest.with_file_name(format!(".{BINARY_NAME}.partial"));
    if let Err(err) = fs::copy(src, &partial) {
        let _ = fs::remove_file(&partial);
        return Err(io_err(&partial, err));
    }
    fs::rename(&partial, dest).map_err(|e| {
        let _ = fs::remove_file(&partial);
        io_err(dest, e)
    })
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), InstallError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), InstallError> {
    Ok(())
}

fn export_line(home: &Path, dir: &Path) -> String {
    match dir.strip_prefix(home) {
        Ok(rel) => format!("export PATH=\"$HOME/{}:$PATH\"", rel.display()),
        Err(_) => format!("export PATH=\"{}:$PATH\"", dir.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_units_are_recognized_by_name() {
        assert!(is_server_unit(Path::new("com.drawthings.grpcserver.plist")));
        assert!(is_server_unit(Path::new("com.example.Draw-Things-GRPC.plist")));
        assert!(!is_server_unit(Path::new("com.drawthings.app.plist")));
        assert!(!is_server_unit(Path::new("com.drawthings.grpcserver.plist.bak")));
    }

    #[test]
    fn lsof_owner_matches_truncated_server_command() {
        assert!(is_server_owner("gRPCServe 321 tester 7u IPv4 TCP *:7859 (LISTEN)"));
        assert!(is_server_owner(
            "python3 9 tester 3u IPv6 TCP *:7859 (LISTEN)\ngRPCServe 321 tester 7u IPv4 TCP *:7859 (LISTEN)"
        ));
        assert!(!is_server_owner("python3 4242 tester 3u IPv4 TCP *:7859 (LISTEN)"));
        assert!(!is_server_owner("gRPC 12 tester 3u IPv4 TCP *:7859 (LISTEN)"));
        assert!(!is_server_owner(""));
    }

    #[test]
    fn permission_denied_removal_suggests_sudo() {
        let binary = Path::new("/usr/local/bin/gRPCServerCLI");
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(
            removal_warning(binary, &denied),
            "permission denied removing /usr/local/bin/gRPCServerCLI; run: sudo rm /usr/local/bin/gRPCServerCLI"
        );
        let other = io::Error::new(io::ErrorKind::Other, "busy");
        assert_eq!(
            removal_warning(binary, &other),
            "failed to remove /usr/local/bin/gRPCServerCLI: busy"
        );
    }

    #[test]
    fn export_line_is_relative_to_home() {
        let home = Path::new("/Users/tester");
        assert_eq!(
            export_line(home, &home.join(".local/bin")),
            "export PATH=\"$HOME/.local/bin:$PATH\""
        );
        assert_eq!(
            export_line(home, Path::new("/opt/bin")),
            "export PATH=\"/opt/bin:$PATH\""
        );
    }

    #[test]
    fn shell_env_picks_rc_file_and_checks_path() {
        let home = Path::new("/Users/tester");
        let zsh = ShellEnv {
            path: Some("/usr/bin:/Users/tester/.local/bin".to_string()),
            shell: None,
        };
        assert_eq!(zsh.rc_file(home), home.join(".zshrc"));
        assert!(zsh.contains(&home.join(".local/bin")));

        let bash = ShellEnv {
            path: Some("/usr/bin".to_string()),
            shell: Some("/bin/bash".to_string()),
        };
        assert_eq!(bash.rc_file(home), home.join(".bash_profile"));
        assert!(!bash.contains(&home.join(".local/bin")));
    }

    #[test]
    fn move_into_place_replaces_destination() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("download");
        let dest = dir.path().join(BINARY_NAME);
        fs::write(&src, b"new").expect("write src");
        fs::write(&dest, b"old").expect("write dest");

        move_into_place(&src, &dest).expect("move");
        make_executable(&dest).expect("chmod");

        assert_eq!(fs::read(&dest).expect("read"), b"new");
        assert!(!src.exists());
    }
}
