//! Post-merge validation of the assembled configuration document.
//!
//! Checks run against the merged plist, not the changeset, so they also
//! catch problems already present in the base template. All violations are
//! collected before reporting; callers wrap a non-empty list in
//! [`Error::Validation`].

use std::path::Path;
use std::process::Command;

use plist::{Dictionary, Value};
use thiserror::Error;
use tracing::debug;

use crate::error::{Error, Result};
use crate::smbios::BOOT_ARGS_GUID;

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
  #[error("{field} must be {expected} bytes, got {actual}")]
  BinaryLength {
    field: &'static str,
    expected: usize,
    actual: usize,
  },

  #[error("SystemUUID '{value}' is not a valid UUID")]
  InvalidUuid { value: String },

  #[error("{kext} requires kernel quirk {quirk} to be enabled")]
  QuirkRequired {
    kext: &'static str,
    quirk: &'static str,
  },

  #[error("{quirk} requires driver {driver} to be present and enabled")]
  DriverRequired {
    quirk: &'static str,
    driver: &'static str,
  },
}

/// Run every structural check and return the collected findings.
pub fn validate_document(root: &Dictionary) -> Vec<Violation> {
  let mut violations = Vec::new();
  check_csr_length(root, &mut violations);
  check_rom_length(root, &mut violations);
  check_system_uuid(root, &mut violations);
  check_linkedit_jettison(root, &mut violations);
  check_custom_slide(root, &mut violations);
  violations
}

/// Validate and return an error carrying all findings at once.
pub fn ensure_valid(root: &Dictionary) -> Result<()> {
  let violations = validate_document(root);
  if violations.is_empty() {
    Ok(())
  } else {
    Err(Error::Validation(violations))
  }
}

fn walk<'a>(root: &'a Dictionary, path: &[&str]) -> Option<&'a Value> {
  let (first, rest) = path.split_first()?;
  let mut current = root.get(first)?;
  for key in rest {
    current = current.as_dictionary()?.get(key)?;
  }
  Some(current)
}

fn check_csr_length(root: &Dictionary, violations: &mut Vec<Violation>) {
  let csr = walk(root, &["NVRAM", "Add", BOOT_ARGS_GUID, "csr-active-config"]);
  if let Some(Value::Data(bytes)) = csr {
    if bytes.len() != 4 {
      violations.push(Violation::BinaryLength {
        field: "csr-active-config",
        expected: 4,
        actual: bytes.len(),
      });
    }
  }
}

fn check_rom_length(root: &Dictionary, violations: &mut Vec<Violation>) {
  let rom = walk(root, &["PlatformInfo", "Generic", "ROM"]);
  if let Some(Value::Data(bytes)) = rom {
    // An all-empty ROM is the template placeholder, not a sizing mistake.
    if !bytes.is_empty() && bytes.len() != 6 {
      violations.push(Violation::BinaryLength {
        field: "ROM",
        expected: 6,
        actual: bytes.len(),
      });
    }
  }
}

fn check_system_uuid(root: &Dictionary, violations: &mut Vec<Violation>) {
  let uuid = walk(root, &["PlatformInfo", "Generic", "SystemUUID"]);
  if let Some(Value::String(value)) = uuid {
    if !value.is_empty() && !is_valid_uuid(value) {
      violations.push(Violation::InvalidUuid {
        value: value.clone(),
      });
    }
  }
}

/// 8-4-4-4-12 hex groups.
fn is_valid_uuid(value: &str) -> bool {
  let groups: Vec<&str> = value.split('-').collect();
  if groups.len() != 5 {
    return false;
  }
  let lengths = [8, 4, 4, 4, 12];
  groups
    .iter()
    .zip(lengths)
    .all(|(group, len)| group.len() == len && group.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Lilu patches the linkedit segment itself; the jettison quirk must be on
/// for its patching to survive on modern kernels.
fn check_linkedit_jettison(root: &Dictionary, violations: &mut Vec<Violation>) {
  let lilu_enabled = walk(root, &["Kernel", "Add"])
    .and_then(Value::as_array)
    .map(|add| {
      add.iter().filter_map(Value::as_dictionary).any(|entry| {
        entry.get("BundlePath").and_then(Value::as_string) == Some("Lilu.kext")
          && entry.get("Enabled").and_then(Value::as_boolean) == Some(true)
      })
    })
    .unwrap_or(false);
  if !lilu_enabled {
    return;
  }

  let jettison = walk(root, &["Kernel", "Quirks", "DisableLinkeditJettison"])
    .and_then(Value::as_boolean)
    .unwrap_or(false);
  if !jettison {
    violations.push(Violation::QuirkRequired {
      kext: "Lilu.kext",
      quirk: "DisableLinkeditJettison",
    });
  }
}

fn check_custom_slide(root: &Dictionary, violations: &mut Vec<Violation>) {
  let slide = walk(root, &["Booter", "Quirks", "ProvideCustomSlide"])
    .and_then(Value::as_boolean)
    .unwrap_or(false);
  if !slide {
    return;
  }

  let runtime_present = walk(root, &["UEFI", "Drivers"])
    .and_then(Value::as_array)
    .map(|drivers| {
      drivers.iter().filter_map(Value::as_dictionary).any(|entry| {
        entry.get("Path").and_then(Value::as_string) == Some("OpenRuntime.efi")
          && entry.get("Enabled").and_then(Value::as_boolean) != Some(false)
      })
    })
    .unwrap_or(false);
  if !runtime_present {
    violations.push(Violation::DriverRequired {
      quirk: "ProvideCustomSlide",
      driver: "OpenRuntime.efi",
    });
  }
}

/// Run the upstream `ocvalidate` utility against a written config, if the
/// binary is available. Skipped silently when it is not.
pub fn run_ocvalidate(binary: &Path, config: &Path) -> Result<()> {
  if !binary.exists() {
    debug!(path = %binary.display(), "ocvalidate not present, skipping");
    return Ok(());
  }
  let status = Command::new(binary).arg(config).status()?;
  if !status.success() {
    return Err(Error::CommandFailed {
      program: "ocvalidate".to_string(),
      status,
    });
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::changeset::Changeset;
  use crate::merge::apply_changeset;
  use crate::testutil::sample_template;

  fn merged(yaml: &str) -> Dictionary {
    let mut root = sample_template();
    let cs = Changeset::from_yaml(yaml).unwrap();
    apply_changeset(&mut root, &cs).unwrap();
    root
  }

  #[test]
  fn clean_template_validates() {
    assert!(validate_document(&sample_template()).is_empty());
  }

  #[test]
  fn short_csr_is_reported() {
    let root = merged("csr_active_config: \"6700\"\n");
    let violations = validate_document(&root);
    assert_eq!(
      violations,
      vec![Violation::BinaryLength {
        field: "csr-active-config",
        expected: 4,
        actual: 2,
      }]
    );
  }

  #[test]
  fn wrong_rom_length_is_reported() {
    let root = merged("smbios:\n  ROM: \"11223344\"\n");
    let violations = validate_document(&root);
    assert_eq!(
      violations,
      vec![Violation::BinaryLength {
        field: "ROM",
        expected: 6,
        actual: 4,
      }]
    );
  }

  #[test]
  fn malformed_uuid_is_reported() {
    let root = merged("smbios:\n  SystemUUID: not-a-uuid\n");
    let violations = validate_document(&root);
    assert!(matches!(violations[0], Violation::InvalidUuid { .. }));
  }

  #[test]
  fn uuid_groups_are_checked() {
    assert!(is_valid_uuid("0FC57E79-1679-4A40-BED5-9E3F73E4D1FB"));
    assert!(!is_valid_uuid("0FC57E79-1679-4A40-BED5"));
    assert!(!is_valid_uuid("0FC57E79-1679-4A40-BED5-9E3F73E4D1FG"));
    assert!(!is_valid_uuid(""));
  }

  #[test]
  fn lilu_without_jettison_quirk_is_reported() {
    let root = merged("kexts:\n  - bundle: Lilu.kext\n    exec: Lilu\n");
    let violations = validate_document(&root);
    assert_eq!(
      violations,
      vec![Violation::QuirkRequired {
        kext: "Lilu.kext",
        quirk: "DisableLinkeditJettison",
      }]
    );

    let fixed = merged(
      "kexts:\n  - bundle: Lilu.kext\n    exec: Lilu\nkernel_quirks:\n  DisableLinkeditJettison: true\n",
    );
    assert!(validate_document(&fixed).is_empty());
  }

  #[test]
  fn disabled_lilu_does_not_require_the_quirk() {
    let root = merged("kexts:\n  - bundle: Lilu.kext\n    exec: Lilu\n    enabled: false\n");
    assert!(validate_document(&root).is_empty());
  }

  #[test]
  fn custom_slide_requires_open_runtime() {
    let root = merged("booter_quirks:\n  ProvideCustomSlide: true\n");
    let violations = validate_document(&root);
    assert_eq!(
      violations,
      vec![Violation::DriverRequired {
        quirk: "ProvideCustomSlide",
        driver: "OpenRuntime.efi",
      }]
    );

    let fixed = merged(
      "booter_quirks:\n  ProvideCustomSlide: true\nuefi_drivers:\n  - path: OpenRuntime.efi\n",
    );
    assert!(validate_document(&fixed).is_empty());
  }

  #[test]
  fn all_violations_are_collected() {
    let root = merged(
      "csr_active_config: \"67\"\nsmbios:\n  SystemUUID: nope\nkexts:\n  - bundle: Lilu.kext\n",
    );
    let violations = validate_document(&root);
    assert_eq!(violations.len(), 3);

    let err = ensure_valid(&root).unwrap_err();
    let rendered = err.to_string();
    assert!(rendered.contains("csr-active-config"));
    assert!(rendered.contains("nope"));
    assert!(rendered.contains("DisableLinkeditJettison"));
  }
}
