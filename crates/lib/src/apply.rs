//! Applying a changeset to the base template.
//!
//! Orchestrates the full pipeline: load the named changeset, merge it into
//! a scratch copy of the template, validate the result, and only then write
//! the merged configuration (plus an audit copy of the changeset) into the
//! build tree. A failed merge or validation leaves the build tree untouched.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use plist::{Dictionary, Value};
use tracing::{info, warn};

use crate::changeset::Changeset;
use crate::error::{Error, Result};
use crate::merge::{self, MergeLog};
use crate::paths::Layout;
use crate::smbios;
use crate::validate;

/// Top-level key recording when the configuration was generated. Ignored by
/// the inverse transform and by idempotence comparisons.
pub const GENERATED_KEY: &str = "#Generated";

#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
  /// Merge and validate, but write nothing.
  pub dry_run: bool,
}

/// What an apply run produced.
#[derive(Debug)]
pub struct ApplyOutcome {
  pub log: MergeLog,
  /// The merged configuration path, `None` on a dry run.
  pub written: Option<PathBuf>,
  /// SMBIOS fields still carrying known placeholder values.
  pub placeholders: Vec<&'static str>,
}

/// Load the base template, requiring a dictionary at the root.
pub fn load_template(path: &Path) -> Result<Dictionary> {
  if !path.exists() {
    return Err(Error::MissingFile(path.to_path_buf()));
  }
  Value::from_file(path)?
    .into_dictionary()
    .ok_or_else(|| Error::MalformedTemplate(path.to_path_buf()))
}

/// Apply the named changeset and write the merged configuration.
pub fn apply(layout: &Layout, name: &str, options: ApplyOptions) -> Result<ApplyOutcome> {
  let changeset_path = layout.changeset_path(name);
  let changeset = Changeset::load(&changeset_path)?;
  apply_changeset_file(layout, &changeset, &changeset_path, options)
}

fn apply_changeset_file(
  layout: &Layout,
  changeset: &Changeset,
  changeset_path: &Path,
  options: ApplyOptions,
) -> Result<ApplyOutcome> {
  let mut document = load_template(&layout.template_path())?;
  let log = merge::apply_changeset(&mut document, changeset)?;
  validate::ensure_valid(&document)?;

  let placeholders = changeset
    .smbios
    .as_ref()
    .map(smbios::placeholder_fields)
    .unwrap_or_default();
  for field in &placeholders {
    warn!(field, "SMBIOS field still carries a placeholder value");
  }

  if options.dry_run {
    info!(actions = log.len(), "dry run, not writing configuration");
    return Ok(ApplyOutcome {
      log,
      written: None,
      placeholders,
    });
  }

  document.insert(
    GENERATED_KEY.to_string(),
    Value::String(Utc::now().to_rfc3339()),
  );

  let output = layout.config_output_path();
  write_plist(&document, &output)?;

  // Audit copy next to the merged configuration.
  fs::copy(changeset_path, layout.oc_dir().join("changeset.yaml"))?;

  info!(actions = log.len(), path = %output.display(), "configuration written");
  Ok(ApplyOutcome {
    log,
    written: Some(output),
    placeholders,
  })
}

/// Write atomically: stage in the target directory, then rename over.
fn write_plist(document: &Dictionary, path: &Path) -> Result<()> {
  let dir = path
    .parent()
    .ok_or_else(|| Error::MissingFile(path.to_path_buf()))?;
  fs::create_dir_all(dir)?;
  let staged = path.with_extension("plist.tmp");
  if let Err(err) = Value::Dictionary(document.clone()).to_file_xml(&staged) {
    let _ = fs::remove_file(&staged);
    return Err(err.into());
  }
  fs::rename(&staged, path)?;
  Ok(())
}

/// Read the merged configuration back as a changeset.
pub fn read_config(layout: &Layout) -> Result<Changeset> {
  read_config_at(&layout.config_output_path())
}

/// Same inverse transform against an arbitrary property-list file.
pub fn read_config_at(path: &Path) -> Result<Changeset> {
  let document = load_template(path)?;
  Ok(crate::reflect::document_to_changeset(&document))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testutil::write_sample_template;
  use tempfile::TempDir;

  fn project_with(changeset_yaml: &str) -> (TempDir, Layout) {
    let dir = TempDir::new().unwrap();
    let layout = Layout::new(dir.path());
    write_sample_template(&layout.template_path()).unwrap();
    fs::create_dir_all(layout.changesets_dir()).unwrap();
    fs::write(layout.changesets_dir().join("testbox.yaml"), changeset_yaml).unwrap();
    (dir, layout)
  }

  #[test]
  fn apply_writes_config_with_generated_marker() {
    let (_dir, layout) = project_with("boot_args: \"-v\"\n");
    let outcome = apply(&layout, "testbox", ApplyOptions::default()).unwrap();

    let written = outcome.written.unwrap();
    assert!(written.exists());
    let document = load_template(&written).unwrap();
    assert!(document.contains_key(GENERATED_KEY));
    assert!(layout.oc_dir().join("changeset.yaml").exists());
  }

  #[test]
  fn dry_run_writes_nothing() {
    let (_dir, layout) = project_with("boot_args: \"-v\"\n");
    let outcome = apply(&layout, "testbox", ApplyOptions { dry_run: true }).unwrap();

    assert!(outcome.written.is_none());
    assert!(!outcome.log.is_empty());
    assert!(!layout.config_output_path().exists());
  }

  #[test]
  fn validation_failure_leaves_build_tree_untouched() {
    let (_dir, layout) = project_with("kexts:\n  - bundle: Lilu.kext\n    exec: Lilu\n");
    let err = apply(&layout, "testbox", ApplyOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(!layout.config_output_path().exists());
  }

  #[test]
  fn unknown_quirk_leaves_build_tree_untouched() {
    let (_dir, layout) = project_with("booter_quirks:\n  Bogus: true\n");
    let err = apply(&layout, "testbox", ApplyOptions::default()).unwrap_err();
    assert!(matches!(err, Error::UnknownKey { .. }));
    assert!(!layout.config_output_path().exists());
  }

  #[test]
  fn missing_changeset_is_reported() {
    let (_dir, layout) = project_with("boot_args: \"-v\"\n");
    let err = apply(&layout, "nope", ApplyOptions::default()).unwrap_err();
    assert!(matches!(err, Error::MissingFile(_)));
  }

  #[test]
  fn reapplying_produces_the_same_document_content() {
    let yaml = "kexts:\n  - bundle: VirtualSMC.kext\n    exec: VirtualSMC\nboot_args: \"-v\"\n";
    let (_dir, layout) = project_with(yaml);

    apply(&layout, "testbox", ApplyOptions::default()).unwrap();
    let mut first = load_template(&layout.config_output_path()).unwrap();

    apply(&layout, "testbox", ApplyOptions::default()).unwrap();
    let mut second = load_template(&layout.config_output_path()).unwrap();

    // Timestamps differ; everything else must not.
    first.remove(GENERATED_KEY);
    second.remove(GENERATED_KEY);
    assert_eq!(first, second);
  }

  #[test]
  fn read_config_inverts_apply() {
    let yaml = "boot_args: \"-v keepsyms=1\"\ncsr_active_config: \"67000000\"\n";
    let (_dir, layout) = project_with(yaml);
    apply(&layout, "testbox", ApplyOptions::default()).unwrap();

    let recovered = read_config(&layout).unwrap();
    assert_eq!(recovered.boot_args.as_deref(), Some("-v keepsyms=1"));
    assert_eq!(recovered.csr_active_config.as_deref(), Some("67000000"));
  }

  #[test]
  fn placeholder_serial_is_flagged() {
    let yaml = "smbios:\n  SystemSerialNumber: C02XD1WJHX87\n";
    let (_dir, layout) = project_with(yaml);
    let outcome = apply(&layout, "testbox", ApplyOptions::default()).unwrap();
    assert_eq!(outcome.placeholders, vec!["SystemSerialNumber"]);
  }
}
