//! Implementation of the `ocforge deploy` command.
//!
//! Builds the ISO for the changeset, uploads it to the configured Proxmox
//! host, attaches it to the VM, and restarts the VM.

use anyhow::{Context, Result};
use ocforge_lib::build::{self, BuildOptions};
use ocforge_lib::deploy::{self, DeployConfig};
use ocforge_lib::Layout;

use crate::output::print_success;

pub fn cmd_deploy(layout: &Layout, changeset: &str, force: bool) -> Result<()> {
  let config = DeployConfig::load(&layout.deploy_config_path())
    .with_context(|| format!("Failed to load {}", layout.deploy_config_path().display()))?;

  build::build(layout, changeset, BuildOptions { force, skip_iso: false })?;
  deploy::deploy(layout, &config, changeset)?;

  print_success(&format!(
    "Deployed '{changeset}' to VM {} on {}",
    config.vmid, config.host
  ));
  Ok(())
}
