//! Implementation of the `ocforge clean` command.

use std::fs;

use anyhow::Result;
use ocforge_lib::{assets, Layout};

use crate::output::{format_bytes, print_success};

pub fn cmd_clean(layout: &Layout) -> Result<()> {
  let removed = assets::clean(layout)?;
  if layout.build_dir().exists() {
    fs::remove_dir_all(layout.build_dir())?;
  }
  print_success(&format!("Cleaned {} of cached assets", format_bytes(removed)));
  Ok(())
}
