//! Test fixtures shared across the workspace.

use std::path::Path;

use plist::{Dictionary, Value};

use crate::changeset::quirks::{self, FlagDefault};
use crate::error::Result;
use crate::smbios::BOOT_ARGS_GUID;

fn default_value(default: &FlagDefault) -> Value {
  match default {
    FlagDefault::Bool(b) => Value::Boolean(*b),
    FlagDefault::Int(i) => Value::Integer((*i).into()),
    FlagDefault::Text(s) => Value::String((*s).to_string()),
  }
}

fn flags_from(table: &[(&str, FlagDefault)]) -> Dictionary {
  let mut dict = Dictionary::new();
  for (name, default) in table {
    dict.insert((*name).to_string(), default_value(default));
  }
  dict
}

fn dict(entries: Vec<(&str, Value)>) -> Value {
  let mut d = Dictionary::new();
  for (key, value) in entries {
    d.insert(key.to_string(), value);
  }
  Value::Dictionary(d)
}

/// A minimal base document with every section the merge engine targets,
/// populated with release defaults. Mirrors the shape of the shipped
/// `efi-template/EFI/OC/config.plist`.
pub fn sample_template() -> Dictionary {
  let mut root = Dictionary::new();

  root.insert(
    "ACPI".into(),
    dict(vec![
      ("Add", Value::Array(Vec::new())),
      ("Quirks", Value::Dictionary(flags_from(quirks::ACPI_QUIRKS))),
    ]),
  );
  root.insert(
    "Booter".into(),
    dict(vec![(
      "Quirks",
      Value::Dictionary(flags_from(quirks::BOOTER_QUIRKS)),
    )]),
  );
  root.insert(
    "DeviceProperties".into(),
    dict(vec![("Add", Value::Dictionary(Dictionary::new()))]),
  );
  root.insert(
    "Kernel".into(),
    dict(vec![
      ("Add", Value::Array(Vec::new())),
      ("Emulate", Value::Dictionary(flags_from(quirks::KERNEL_EMULATE))),
      ("Patch", Value::Array(Vec::new())),
      ("Quirks", Value::Dictionary(flags_from(quirks::KERNEL_QUIRKS))),
    ]),
  );
  root.insert(
    "Misc".into(),
    dict(vec![
      ("Boot", Value::Dictionary(flags_from(quirks::MISC_BOOT))),
      ("Security", Value::Dictionary(flags_from(quirks::MISC_SECURITY))),
      ("Tools", Value::Array(Vec::new())),
    ]),
  );

  let mut boot_args_vars = Dictionary::new();
  boot_args_vars.insert("boot-args".into(), Value::String(String::new()));
  boot_args_vars.insert(
    "csr-active-config".into(),
    Value::Data(quirks::CSR_DEFAULT.to_vec()),
  );
  let mut nvram_add = Dictionary::new();
  nvram_add.insert(BOOT_ARGS_GUID.to_string(), Value::Dictionary(boot_args_vars));
  root.insert("NVRAM".into(), dict(vec![("Add", Value::Dictionary(nvram_add))]));

  root.insert(
    "PlatformInfo".into(),
    dict(vec![(
      "Generic",
      dict(vec![
        ("SystemProductName", Value::String(String::new())),
        ("SystemSerialNumber", Value::String(String::new())),
        ("MLB", Value::String(String::new())),
        ("SystemUUID", Value::String(String::new())),
        ("ROM", Value::Data(Vec::new())),
      ]),
    )]),
  );
  root.insert(
    "UEFI".into(),
    dict(vec![("Drivers", Value::Array(Vec::new()))]),
  );

  root
}

/// Write the sample template to `path`, creating parent directories.
pub fn write_sample_template(path: &Path) -> Result<()> {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  Value::Dictionary(sample_template()).to_file_xml(path)?;
  Ok(())
}
