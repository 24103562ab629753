//! Implementation of the `ocforge build` command.
//!
//! Runs the full pipeline: fetch assets if missing, apply the changeset,
//! prune unused kexts, validate, and wrap the EFI tree in a bootable ISO.

use anyhow::Result;
use ocforge_lib::build::{self, BuildOptions};
use ocforge_lib::Layout;

use crate::output::{print_error, print_success, symbols};

pub fn cmd_build(layout: &Layout, changeset: &str, force: bool, skip_iso: bool) -> Result<()> {
  let options = BuildOptions { force, skip_iso };
  let artifact = match build::build(layout, changeset, options) {
    Ok(path) => path,
    Err(e) => {
      print_error(&format!("Build failed: {e}"));
      return Err(e.into());
    }
  };

  print_success(&format!(
    "Built '{changeset}' {} {}",
    symbols::ARROW,
    artifact.display()
  ));
  Ok(())
}
