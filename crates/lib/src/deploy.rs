//! Deploying a built image to a Proxmox host over SSH.
//!
//! The built ISO is uploaded with `scp`, attached to the target VM as an
//! IDE disk, and the VM is restarted. Host details live in
//! `config/deploy.yaml`.

use std::fs;
use std::path::Path;
use std::process::Command;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::paths::Layout;

/// The `config/deploy.yaml` document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
  pub host: String,
  pub user: String,
  pub vmid: u32,
  /// ISO storage directory on the host.
  #[serde(default = "default_iso_dir")]
  pub iso_dir: String,
}

fn default_iso_dir() -> String {
  "/var/lib/vz/template/iso".to_string()
}

impl DeployConfig {
  pub fn load(path: &Path) -> Result<Self> {
    if !path.exists() {
      return Err(Error::MissingFile(path.to_path_buf()));
    }
    let text = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&text)?)
  }

  fn target(&self) -> String {
    format!("{}@{}", self.user, self.host)
  }
}

/// Upload the ISO, attach it to the VM, and restart the VM.
pub fn deploy(layout: &Layout, config: &DeployConfig, changeset_name: &str) -> Result<()> {
  let iso = layout.iso_path();
  if !iso.exists() {
    return Err(Error::MissingFile(iso));
  }

  let iso_name = format!("opencore-{changeset_name}.iso");
  info!(vmid = config.vmid, host = %config.host, "deploying {iso_name}");

  scp(config, &iso, &format!("{}/{iso_name}", config.iso_dir))?;

  // The VM may already be stopped.
  if ssh(config, &format!("qm stop {}", config.vmid)).is_err() {
    warn!(vmid = config.vmid, "stop failed, assuming VM was not running");
  }
  ssh(
    config,
    &format!(
      "qm set {} -ide0 local:iso/{iso_name},media=disk,cache=unsafe,size=10M",
      config.vmid
    ),
  )?;
  ssh(config, &format!("qm start {}", config.vmid))?;

  info!(vmid = config.vmid, "deployment complete, VM booting");
  Ok(())
}

/// What `status` reports about the local build and the remote VM.
#[derive(Debug)]
pub struct DeployStatus {
  pub iso_present: bool,
  pub config_present: bool,
  pub vm_status: Option<String>,
}

/// Check local artifacts and, when the host is reachable, the VM state.
pub fn status(layout: &Layout, config: Option<&DeployConfig>) -> DeployStatus {
  let vm_status = config.and_then(query_vm_status);
  DeployStatus {
    iso_present: layout.iso_path().exists(),
    config_present: layout.config_output_path().exists(),
    vm_status,
  }
}

fn query_vm_status(config: &DeployConfig) -> Option<String> {
  let output = Command::new("ssh")
    .args(["-o", "ConnectTimeout=5", "-o", "BatchMode=yes"])
    .arg(config.target())
    .arg(format!("qm status {}", config.vmid))
    .output()
    .ok()?;
  if !output.status.success() {
    warn!(host = %config.host, "could not query VM status");
    return None;
  }
  Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn ssh(config: &DeployConfig, command: &str) -> Result<()> {
  run_checked(
    Command::new("ssh").arg(config.target()).arg(command),
    "ssh",
  )
}

fn scp(config: &DeployConfig, local: &Path, remote: &str) -> Result<()> {
  run_checked(
    Command::new("scp")
      .arg(local)
      .arg(format!("{}:{remote}", config.target())),
    "scp",
  )
}

fn run_checked(command: &mut Command, program: &str) -> Result<()> {
  let status = command.status()?;
  if !status.success() {
    return Err(Error::CommandFailed {
      program: program.to_string(),
      status,
    });
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn config_parses_with_default_iso_dir() {
    let config: DeployConfig =
      serde_yaml::from_str("host: pve.lan\nuser: root\nvmid: 100\n").unwrap();
    assert_eq!(config.target(), "root@pve.lan");
    assert_eq!(config.iso_dir, "/var/lib/vz/template/iso");
  }

  #[test]
  fn unknown_config_key_is_rejected() {
    let err =
      serde_yaml::from_str::<DeployConfig>("host: pve.lan\nuser: root\nvmid: 100\nvm: 1\n")
        .unwrap_err();
    assert!(err.to_string().contains("vm"));
  }

  #[test]
  fn deploy_requires_a_built_iso() {
    let dir = TempDir::new().unwrap();
    let layout = Layout::new(dir.path());
    let config: DeployConfig =
      serde_yaml::from_str("host: pve.lan\nuser: root\nvmid: 100\n").unwrap();
    let err = deploy(&layout, &config, "testbox").unwrap_err();
    assert!(matches!(err, Error::MissingFile(_)));
  }

  #[test]
  fn status_reports_local_artifacts() {
    let dir = TempDir::new().unwrap();
    let layout = Layout::new(dir.path());
    let status = status(&layout, None);
    assert!(!status.iso_present);
    assert!(!status.config_present);
    assert!(status.vm_status.is_none());
  }
}
