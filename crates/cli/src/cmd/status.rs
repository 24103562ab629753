//! Implementation of the `ocforge status` command.
//!
//! Shows local build artifacts, available changesets, and (when the deploy
//! config is present and the host reachable) the remote VM state.

use anyhow::Result;
use ocforge_lib::deploy::{self, DeployConfig};
use ocforge_lib::Layout;

use crate::output::{print_info, print_json, print_stat, symbols};

pub fn cmd_status(layout: &Layout, json: bool) -> Result<()> {
  let deploy_config = DeployConfig::load(&layout.deploy_config_path()).ok();
  let status = deploy::status(layout, deploy_config.as_ref());
  let changesets = layout.list_changesets().unwrap_or_default();

  if json {
    print_json(&serde_json::json!({
      "iso_present": status.iso_present,
      "config_present": status.config_present,
      "vm_status": status.vm_status,
      "changesets": changesets,
    }))?;
    return Ok(());
  }

  let mark = |present: bool| if present { symbols::SUCCESS } else { symbols::ERROR };

  print_info("Local artifacts");
  print_stat(
    "config.plist",
    &format!("{} {}", mark(status.config_present), layout.config_output_path().display()),
  );
  print_stat(
    "ISO",
    &format!("{} {}", mark(status.iso_present), layout.iso_path().display()),
  );

  if !changesets.is_empty() {
    println!();
    print_info("Changesets");
    for name in &changesets {
      print_stat("-", name);
    }
  }

  println!();
  match (&deploy_config, &status.vm_status) {
    (Some(config), Some(vm)) => {
      print_info(&format!("VM {} on {}", config.vmid, config.host));
      print_stat("State", vm);
    }
    (Some(config), None) => {
      print_info(&format!("VM {} on {} (unreachable)", config.vmid, config.host));
    }
    (None, _) => print_stat("Deploy", "not configured"),
  }
  Ok(())
}
