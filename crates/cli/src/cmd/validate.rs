//! Implementation of the `ocforge validate` command.
//!
//! Merges the changeset into a scratch copy of the template and reports
//! every validation finding without writing anything. Also runs the
//! upstream `ocvalidate` tool when a fetched release provides it.

use anyhow::Result;
use ocforge_lib::error::Error;
use ocforge_lib::{apply, merge, validate, Changeset, Layout};

use crate::output::{print_error, print_success};

pub fn cmd_validate(layout: &Layout, changeset: &str) -> Result<()> {
  let changeset_doc = Changeset::load(&layout.changeset_path(changeset))?;
  let mut document = apply::load_template(&layout.template_path())?;
  merge::apply_changeset(&mut document, &changeset_doc)?;

  let violations = validate::validate_document(&document);
  if !violations.is_empty() {
    for violation in &violations {
      print_error(&violation.to_string());
    }
    return Err(Error::Validation(violations).into());
  }

  let written_config = layout.config_output_path();
  if written_config.exists() {
    validate::run_ocvalidate(&layout.ocvalidate_path(), &written_config)?;
  }

  print_success(&format!("'{changeset}' validates cleanly"));
  Ok(())
}
