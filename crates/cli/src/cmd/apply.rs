//! Implementation of the `ocforge apply` command.
//!
//! Merges the named changeset into the base template, validates the result,
//! and writes `config.plist` into the build tree. With `--dry-run` the merge
//! and validation still run but nothing is written.

use anyhow::Result;
use ocforge_lib::apply::{self, ApplyOptions};
use ocforge_lib::Layout;

use crate::output::{print_error, print_info, print_success, print_warning};

pub fn cmd_apply(layout: &Layout, changeset: &str, dry_run: bool) -> Result<()> {
  let outcome = match apply::apply(layout, changeset, ApplyOptions { dry_run }) {
    Ok(outcome) => outcome,
    Err(e) => {
      print_error(&format!("Apply failed: {e}"));
      return Err(e.into());
    }
  };

  for action in outcome.log.iter() {
    print_info(&action.to_string());
  }
  for field in &outcome.placeholders {
    print_warning(&format!("{field} still carries a placeholder value"));
  }

  match outcome.written {
    Some(path) => print_success(&format!(
      "Applied '{changeset}' ({} actions) {} {}",
      outcome.log.len(),
      crate::output::symbols::ARROW,
      path.display()
    )),
    None => print_success(&format!(
      "Dry run: '{changeset}' merges cleanly ({} actions)",
      outcome.log.len()
    )),
  }
  Ok(())
}
