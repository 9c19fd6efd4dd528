pub mod install;
pub mod restart;
pub mod uninstall;

use std::path::PathBuf;

use anyhow::{Context, Result};

use dts_installer::{GithubReleases, InstallLayout, SystemProbe};

/// Real host capabilities shared by the lifecycle subcommands.
pub struct Host {
    pub layout: InstallLayout,
    pub probe: SystemProbe,
    pub releases: GithubReleases,
}

impl Host {
    pub fn detect() -> Result<Self> {
        let home = home_dir()?;
        tracing::debug!(home = %home.display(), "using install layout");
        Ok(Self {
            layout: InstallLayout::for_home(&home),
            probe: SystemProbe::new().context("failed to start probe runtime")?,
            releases: GithubReleases::new(),
        })
    }
}

pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}
