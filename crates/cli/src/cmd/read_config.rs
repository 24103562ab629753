//! Implementation of the `ocforge read-config` command.
//!
//! Reads a `config.plist` back into changeset form and prints it, YAML by
//! default or JSON with `--json`, or writes it to a file with `--output`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use ocforge_lib::{apply, Layout};

use crate::output::{print_json, print_success};

pub fn cmd_read_config(
  layout: &Layout,
  plist: Option<&Path>,
  output: Option<&Path>,
  json: bool,
) -> Result<()> {
  let changeset = match plist {
    Some(path) => apply::read_config_at(path)
      .with_context(|| format!("Failed to read {}", path.display()))?,
    None => apply::read_config(layout)
      .context("Failed to read generated configuration (run 'ocforge apply' first)")?,
  };

  if let Some(dest) = output {
    fs::write(dest, changeset.to_yaml()?)
      .with_context(|| format!("Failed to write {}", dest.display()))?;
    print_success(&format!("Recovered changeset written to {}", dest.display()));
  } else if json {
    print_json(&changeset)?;
  } else {
    let yaml = changeset.to_yaml()?;
    print!("{yaml}");
  }
  Ok(())
}
