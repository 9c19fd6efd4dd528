use std::path::Path;

use crate::error::InstallError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Running { pid: u32 },
    /// Registered but no live process (crashed, or between restarts).
    Loaded,
    NotLoaded,
}

/// The OS service supervisor, reduced to what the installer needs.
pub trait Supervisor {
    /// Register the unit at `unit` and start it.
    fn start(&self, unit: &Path) -> Result<(), InstallError>;

    /// Stop the unit and unregister it. Stopping an unloaded unit succeeds.
    fn stop(&self, unit: &Path) -> Result<(), InstallError>;

    fn status(&self, unit: &Path) -> ServiceStatus;
}
