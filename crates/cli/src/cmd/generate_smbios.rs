//! Implementation of the `ocforge generate-smbios` command.
//!
//! Fills placeholder SMBIOS identity fields in a changeset: serial and MLB
//! come from the fetched macserial utility, UUID and ROM are generated
//! locally. The changeset file is rewritten in place.

use anyhow::{bail, Context, Result};
use ocforge_lib::{smbios, Changeset, Layout};

use crate::output::{print_info, print_success};

pub fn cmd_generate_smbios(layout: &Layout, changeset: &str, force: bool) -> Result<()> {
  let path = layout.changeset_path(changeset);
  let mut document = Changeset::load(&path)?;
  let Some(identity) = document.smbios.as_mut() else {
    bail!("'{changeset}' has no smbios section to fill");
  };

  let filled = smbios::fill_placeholders(identity, &layout.macserial_path(), force)
    .context("Failed to generate SMBIOS data (run 'ocforge fetch' first)")?;

  if filled.is_empty() {
    print_success(&format!("'{changeset}' already carries a real identity"));
    return Ok(());
  }

  document.save(&path)?;
  for field in &filled {
    print_info(&format!("generated {field}"));
  }
  print_success(&format!(
    "Updated '{changeset}' ({} identity fields)",
    filled.len()
  ));
  Ok(())
}
