//! Implementation of the `ocforge fetch` command.

use anyhow::{Context, Result};
use ocforge_lib::assets::{self, Sources};
use ocforge_lib::Layout;

use crate::output::print_success;

pub fn cmd_fetch(layout: &Layout) -> Result<()> {
  let sources = Sources::load(&layout.sources_path())
    .with_context(|| format!("Failed to load {}", layout.sources_path().display()))?;
  assets::fetch_all(layout, &sources)?;
  print_success(&format!(
    "Fetched OpenCore {}, {} kext(s), {} driver(s)",
    sources.opencore.version,
    sources.kexts.len(),
    sources.drivers.len()
  ));
  Ok(())
}
