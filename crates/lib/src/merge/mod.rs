//! The changeset merge engine.
//!
//! Applies a [`Changeset`] to a configuration document in place, recording
//! every action in a [`MergeLog`]. Each section is handled by one of five
//! strategies, driven by the [`SECTIONS`] registry so the inverse transform
//! and validation can stay table-driven:
//!
//! - scalar overwrite (`boot_args`, `csr_active_config`, security scalars)
//! - flat flag maps with known-name checking (quirk sections, `misc_boot`)
//! - identified lists with upsert-by-identity (`kexts`, `tools`, ...)
//! - keyed map of records merged per key (`device_properties`)
//! - the SMBIOS section with its NVRAM mirroring side effect
//!
//! Re-applying the same changeset converges: identified lists replace in
//! place instead of growing, and every other strategy overwrites.

pub mod log;

use plist::{Dictionary, Value};

use crate::changeset::quirks::{self, FlagDefault};
use crate::changeset::{Changeset, DriverEntry, KernelPatch, KextEntry, Smbios, ToolEntry};
use crate::data;
use crate::error::{Error, Result};
use crate::smbios::{BOOT_ARGS_GUID, MIRRORED_FIELDS, PLATFORM_GUID};

pub use log::{MergeAction, MergeLog};

/// How a changeset section combines with the base document.
#[derive(Debug, Clone, Copy)]
pub enum Strategy {
  /// Changeset value replaces the base value unconditionally.
  Scalar,
  /// Key-by-key overwrite; unknown keys are a schema error.
  Flags(&'static [(&'static str, FlagDefault)]),
  /// Upsert-by-identity into an ordered list.
  IdentifiedList { id_key: &'static str },
  /// Per-device property maps merged key-by-key.
  KeyedMap,
  /// Platform identity block plus the NVRAM mirroring rule.
  Smbios,
}

/// One changeset section: its name, target path in the document, and merge
/// strategy. Application order follows this table.
pub struct Section {
  pub name: &'static str,
  pub target: &'static [&'static str],
  pub strategy: Strategy,
}

pub const SECTIONS: &[Section] = &[
  Section {
    name: "kexts",
    target: &["Kernel", "Add"],
    strategy: Strategy::IdentifiedList { id_key: "BundlePath" },
  },
  Section {
    name: "booter_quirks",
    target: &["Booter", "Quirks"],
    strategy: Strategy::Flags(quirks::BOOTER_QUIRKS),
  },
  Section {
    name: "kernel_quirks",
    target: &["Kernel", "Quirks"],
    strategy: Strategy::Flags(quirks::KERNEL_QUIRKS),
  },
  Section {
    name: "kernel_emulate",
    target: &["Kernel", "Emulate"],
    strategy: Strategy::Flags(quirks::KERNEL_EMULATE),
  },
  Section {
    name: "kernel_patches",
    target: &["Kernel", "Patch"],
    strategy: Strategy::IdentifiedList { id_key: "Comment" },
  },
  Section {
    name: "boot_args",
    target: &["NVRAM", "Add", BOOT_ARGS_GUID, "boot-args"],
    strategy: Strategy::Scalar,
  },
  Section {
    name: "csr_active_config",
    target: &["NVRAM", "Add", BOOT_ARGS_GUID, "csr-active-config"],
    strategy: Strategy::Scalar,
  },
  Section {
    name: "smbios",
    target: &["PlatformInfo", "Generic"],
    strategy: Strategy::Smbios,
  },
  Section {
    name: "acpi_add",
    target: &["ACPI", "Add"],
    strategy: Strategy::IdentifiedList { id_key: "Path" },
  },
  Section {
    name: "acpi_quirks",
    target: &["ACPI", "Quirks"],
    strategy: Strategy::Flags(quirks::ACPI_QUIRKS),
  },
  Section {
    name: "uefi_drivers",
    target: &["UEFI", "Drivers"],
    strategy: Strategy::IdentifiedList { id_key: "Path" },
  },
  Section {
    name: "tools",
    target: &["Misc", "Tools"],
    strategy: Strategy::IdentifiedList { id_key: "Name" },
  },
  Section {
    name: "device_properties",
    target: &["DeviceProperties", "Add"],
    strategy: Strategy::KeyedMap,
  },
  Section {
    name: "misc_boot",
    target: &["Misc", "Boot"],
    strategy: Strategy::Flags(quirks::MISC_BOOT),
  },
  Section {
    name: "secureboot_model",
    target: &["Misc", "Security", "SecureBootModel"],
    strategy: Strategy::Scalar,
  },
  Section {
    name: "vault",
    target: &["Misc", "Security", "Vault"],
    strategy: Strategy::Scalar,
  },
  Section {
    name: "scan_policy",
    target: &["Misc", "Security", "ScanPolicy"],
    strategy: Strategy::Scalar,
  },
];

/// Apply `changeset` to `root`, returning the ordered action log.
///
/// The document is mutated even on error; callers that need all-or-nothing
/// behavior work on a scratch copy (see `apply::apply`).
pub fn apply_changeset(root: &mut Dictionary, changeset: &Changeset) -> Result<MergeLog> {
  let mut log = MergeLog::default();
  for section in SECTIONS {
    apply_section(root, changeset, section, &mut log)?;
  }
  Ok(log)
}

fn apply_section(
  root: &mut Dictionary,
  changeset: &Changeset,
  section: &Section,
  log: &mut MergeLog,
) -> Result<()> {
  match section.strategy {
    Strategy::Scalar => {
      if let Some((value, rendered)) = scalar_value(changeset, section.name)? {
        set_scalar(root, section.target, value, rendered, log);
      }
    }
    Strategy::Flags(table) => {
      let entries = flag_entries(changeset, section.name);
      merge_flags(root, section, table, entries, log)?;
    }
    Strategy::IdentifiedList { id_key } => {
      for entry in list_entries(changeset, section.name)? {
        upsert(root, section.target, id_key, entry, log);
      }
    }
    Strategy::KeyedMap => {
      merge_device_properties(root, changeset, section.target, log)?;
    }
    Strategy::Smbios => {
      if let Some(smbios) = &changeset.smbios {
        apply_smbios(root, smbios, log)?;
      }
    }
  }
  Ok(())
}

/// Scalar sections: the plist value plus its rendering for the log.
fn scalar_value(changeset: &Changeset, name: &str) -> Result<Option<(Value, String)>> {
  let pair = match name {
    "boot_args" => changeset
      .boot_args
      .as_ref()
      .map(|s| (Value::String(s.clone()), s.clone())),
    "csr_active_config" => match &changeset.csr_active_config {
      Some(text) => {
        let bytes = data::parse_hex("csr_active_config", text)?;
        let rendered = data::to_hex_upper(&bytes);
        Some((Value::Data(bytes), rendered))
      }
      None => None,
    },
    "secureboot_model" => changeset
      .secureboot_model
      .as_ref()
      .map(|s| (Value::String(s.clone()), s.clone())),
    "vault" => changeset
      .vault
      .as_ref()
      .map(|s| (Value::String(s.clone()), s.clone())),
    "scan_policy" => changeset
      .scan_policy
      .map(|i| (Value::Integer(i.into()), i.to_string())),
    _ => None,
  };
  Ok(pair)
}

fn flag_entries<'a>(changeset: &'a Changeset, name: &str) -> &'a crate::changeset::FlagMap {
  static EMPTY: std::sync::LazyLock<crate::changeset::FlagMap> =
    std::sync::LazyLock::new(crate::changeset::FlagMap::new);
  match name {
    "booter_quirks" => &changeset.booter_quirks,
    "kernel_quirks" => &changeset.kernel_quirks,
    "kernel_emulate" => &changeset.kernel_emulate,
    "acpi_quirks" => &changeset.acpi_quirks,
    "misc_boot" => &changeset.misc_boot,
    _ => &EMPTY,
  }
}

/// Identified-list sections rendered as plist dictionaries, in changeset
/// order.
fn list_entries(changeset: &Changeset, name: &str) -> Result<Vec<Dictionary>> {
  let entries = match name {
    "kexts" => changeset.kexts.iter().map(kext_entry).collect(),
    "kernel_patches" => changeset
      .kernel_patches
      .iter()
      .map(patch_entry)
      .collect::<Result<Vec<_>>>()?,
    "acpi_add" => changeset.acpi_add.iter().map(|path| acpi_entry(path)).collect(),
    "uefi_drivers" => changeset.uefi_drivers.iter().map(driver_entry).collect(),
    "tools" => changeset.tools.iter().map(tool_entry).collect(),
    _ => Vec::new(),
  };
  Ok(entries)
}

fn kext_entry(kext: &KextEntry) -> Dictionary {
  let exec_path = match kext.exec.as_deref() {
    Some(exec) if !exec.trim().is_empty() => format!("Contents/MacOS/{exec}"),
    _ => String::new(),
  };

  let mut entry = Dictionary::new();
  entry.insert("BundlePath".into(), Value::String(kext.bundle.clone()));
  entry.insert("Enabled".into(), Value::Boolean(kext.enabled));
  entry.insert("ExecutablePath".into(), Value::String(exec_path));
  entry.insert("PlistPath".into(), Value::String("Contents/Info.plist".into()));
  entry
}

fn patch_entry(patch: &KernelPatch) -> Result<Dictionary> {
  let mut entry = Dictionary::new();
  entry.insert("Arch".into(), Value::String(patch.arch.clone()));
  entry.insert("Base".into(), Value::String(String::new()));
  entry.insert("Comment".into(), Value::String(patch.comment.clone()));
  entry.insert("Count".into(), Value::Integer(patch.count.into()));
  entry.insert("Enabled".into(), Value::Boolean(patch.enabled));
  entry.insert("Find".into(), Value::Data(patch.find.decode("Find")?));
  entry.insert("Identifier".into(), Value::String(patch.identifier.clone()));
  entry.insert("Limit".into(), Value::Integer(patch.limit.into()));
  let mask = match &patch.mask {
    Some(mask) => mask.decode("Mask")?,
    None => Vec::new(),
  };
  entry.insert("Mask".into(), Value::Data(mask));
  entry.insert("MaxKernel".into(), Value::String(patch.max_kernel.clone()));
  entry.insert("MinKernel".into(), Value::String(patch.min_kernel.clone()));
  entry.insert("Replace".into(), Value::Data(patch.replace.decode("Replace")?));
  let replace_mask = match &patch.replace_mask {
    Some(mask) => mask.decode("ReplaceMask")?,
    None => Vec::new(),
  };
  entry.insert("ReplaceMask".into(), Value::Data(replace_mask));
  entry.insert("Skip".into(), Value::Integer(patch.skip.into()));
  Ok(entry)
}

fn acpi_entry(path: &str) -> Dictionary {
  let mut entry = Dictionary::new();
  entry.insert("Path".into(), Value::String(path.to_string()));
  entry.insert("Enabled".into(), Value::Boolean(true));
  entry
}

fn driver_entry(driver: &DriverEntry) -> Dictionary {
  let mut entry = Dictionary::new();
  entry.insert("Path".into(), Value::String(driver.path.clone()));
  entry.insert("Enabled".into(), Value::Boolean(driver.enabled));
  entry.insert("LoadEarly".into(), Value::Boolean(driver.load_early));
  entry.insert("Arguments".into(), Value::String(driver.arguments.clone()));
  if !driver.comment.is_empty() {
    entry.insert("Comment".into(), Value::String(driver.comment.clone()));
  }
  entry
}

fn tool_entry(tool: &ToolEntry) -> Dictionary {
  let mut entry = Dictionary::new();
  entry.insert("Name".into(), Value::String(tool.name.clone()));
  entry.insert("Path".into(), Value::String(tool.path.clone()));
  entry.insert("Enabled".into(), Value::Boolean(tool.enabled));
  entry.insert("Auxiliary".into(), Value::Boolean(tool.auxiliary));
  entry.insert("Arguments".into(), Value::String(String::new()));
  entry.insert("Comment".into(), Value::String(String::new()));
  entry.insert("Flavour".into(), Value::String("Auto".into()));
  entry.insert("FullNvramAccess".into(), Value::Boolean(false));
  entry.insert("RealPath".into(), Value::Boolean(false));
  entry.insert("TextMode".into(), Value::Boolean(false));
  entry
}

fn set_scalar(
  root: &mut Dictionary,
  target: &[&str],
  value: Value,
  rendered: String,
  log: &mut MergeLog,
) {
  let (parents, key) = split_target(target);
  let parent = dict_at(root, parents);
  parent.insert(key.to_string(), value);
  log.push(MergeAction::Set {
    path: target.join("."),
    value: rendered,
  });
}

fn merge_flags(
  root: &mut Dictionary,
  section: &Section,
  table: &[(&str, FlagDefault)],
  entries: &crate::changeset::FlagMap,
  log: &mut MergeLog,
) -> Result<()> {
  if entries.is_empty() {
    return Ok(());
  }

  // Check every name before touching the document.
  for name in entries.keys() {
    if section.name == "kernel_quirks" && name == "DummyPowerManagement" {
      return Err(Error::MisplacedEmulateFlag);
    }
    if quirks::lookup(table, name).is_none() {
      return Err(Error::UnknownKey {
        section: section.name,
        name: name.clone(),
      });
    }
  }

  let target = dict_at(root, section.target);
  for (name, value) in entries {
    target.insert(name.clone(), value.to_plist());
    log.push(MergeAction::Merged {
      path: section.target.join("."),
      key: name.clone(),
    });
  }
  Ok(())
}

/// Replace the entry with the same identity in place, or append.
fn upsert(root: &mut Dictionary, target: &[&str], id_key: &str, entry: Dictionary, log: &mut MergeLog) {
  let id = entry
    .get(id_key)
    .and_then(Value::as_string)
    .unwrap_or_default()
    .to_string();
  let array = array_at(root, target);

  let existing = array.iter_mut().find(|value| {
    value
      .as_dictionary()
      .and_then(|d| d.get(id_key))
      .and_then(Value::as_string)
      == Some(id.as_str())
  });

  match existing {
    Some(slot) => {
      *slot = Value::Dictionary(entry);
      log.push(MergeAction::Replaced {
        path: target.join("."),
        id,
      });
    }
    None => {
      array.push(Value::Dictionary(entry));
      log.push(MergeAction::Appended {
        path: target.join("."),
        id,
      });
    }
  }
}

fn merge_device_properties(
  root: &mut Dictionary,
  changeset: &Changeset,
  target: &[&str],
  log: &mut MergeLog,
) -> Result<()> {
  if changeset.device_properties.is_empty() {
    return Ok(());
  }

  let add = dict_at(root, target);
  for (device, properties) in &changeset.device_properties {
    if !matches!(add.get(device), Some(Value::Dictionary(_))) {
      add.insert(device.clone(), Value::Dictionary(Dictionary::new()));
    }
    let device_dict = match add.get_mut(device) {
      Some(Value::Dictionary(d)) => d,
      _ => continue,
    };
    for (key, value) in properties {
      device_dict.insert(key.clone(), value.to_plist(key)?);
      log.push(MergeAction::Merged {
        path: format!("DeviceProperties.Add.{device}"),
        key: key.clone(),
      });
    }
  }
  Ok(())
}

fn apply_smbios(root: &mut Dictionary, smbios: &Smbios, log: &mut MergeLog) -> Result<()> {
  let generic = dict_at(root, &["PlatformInfo", "Generic"]);

  let fields: [(&str, Option<&String>); 4] = [
    ("SystemProductName", smbios.product_name.as_ref()),
    ("SystemSerialNumber", smbios.serial.as_ref()),
    ("MLB", smbios.mlb.as_ref()),
    ("SystemUUID", smbios.uuid.as_ref()),
  ];
  for (key, value) in fields {
    if let Some(value) = value {
      generic.insert(key.to_string(), Value::String(value.clone()));
      log.push(MergeAction::Merged {
        path: "PlatformInfo.Generic".to_string(),
        key: key.to_string(),
      });
    }
  }
  if let Some(rom) = &smbios.rom {
    generic.insert("ROM".to_string(), Value::Data(rom.decode("ROM")?));
    log.push(MergeAction::Merged {
      path: "PlatformInfo.Generic".to_string(),
      key: "ROM".to_string(),
    });
  }

  // Mirror identity fields into the firmware's runtime variable store.
  let nvram = dict_at(root, &["NVRAM", "Add", PLATFORM_GUID]);
  for field in MIRRORED_FIELDS {
    let value = match *field {
      "SystemSerialNumber" => smbios.serial.as_ref(),
      "MLB" => smbios.mlb.as_ref(),
      "SystemUUID" => smbios.uuid.as_ref(),
      _ => None,
    };
    if let Some(value) = value {
      nvram.insert(field.to_string(), Value::String(value.clone()));
      log.push(MergeAction::NvramCopy {
        field: field.to_string(),
      });
    }
  }
  Ok(())
}

fn split_target<'a>(target: &'a [&'a str]) -> (&'a [&'a str], &'a str) {
  let (last, parents) = target
    .split_last()
    .unwrap_or((&"", &[]));
  (parents, last)
}

/// Walk to (and create) the dictionary at `path`.
fn dict_at<'a>(root: &'a mut Dictionary, path: &[&str]) -> &'a mut Dictionary {
  let mut current = root;
  for key in path {
    if !matches!(current.get(key), Some(Value::Dictionary(_))) {
      current.insert((*key).to_string(), Value::Dictionary(Dictionary::new()));
    }
    current = match current.get_mut(key) {
      Some(Value::Dictionary(d)) => d,
      _ => unreachable!("dictionary was just inserted"),
    };
  }
  current
}

/// Walk to (and create) the array at `path`.
fn array_at<'a>(root: &'a mut Dictionary, target: &[&str]) -> &'a mut Vec<Value> {
  let (parents, key) = split_target(target);
  let parent = dict_at(root, parents);
  if !matches!(parent.get(key), Some(Value::Array(_))) {
    parent.insert(key.to_string(), Value::Array(Vec::new()));
  }
  match parent.get_mut(key) {
    Some(Value::Array(a)) => a,
    _ => unreachable!("array was just inserted"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testutil::sample_template;

  fn parse(yaml: &str) -> Changeset {
    Changeset::from_yaml(yaml).unwrap()
  }

  fn kernel_add(root: &Dictionary) -> &Vec<Value> {
    root
      .get("Kernel")
      .and_then(Value::as_dictionary)
      .and_then(|k| k.get("Add"))
      .and_then(Value::as_array)
      .unwrap()
  }

  fn nvram_section<'a>(root: &'a Dictionary, guid: &str) -> &'a Dictionary {
    root
      .get("NVRAM")
      .and_then(Value::as_dictionary)
      .and_then(|n| n.get("Add"))
      .and_then(Value::as_dictionary)
      .and_then(|a| a.get(guid))
      .and_then(Value::as_dictionary)
      .unwrap()
  }

  #[test]
  fn kext_applies_with_expanded_executable_path() {
    let mut root = sample_template();
    let cs = parse("kexts:\n  - bundle: Lilu.kext\n    exec: Lilu\n");
    let log = apply_changeset(&mut root, &cs).unwrap();

    let add = kernel_add(&root);
    assert_eq!(add.len(), 1);
    let entry = add[0].as_dictionary().unwrap();
    assert_eq!(entry.get("BundlePath").and_then(Value::as_string), Some("Lilu.kext"));
    assert_eq!(
      entry.get("ExecutablePath").and_then(Value::as_string),
      Some("Contents/MacOS/Lilu")
    );
    assert_eq!(
      entry.get("PlistPath").and_then(Value::as_string),
      Some("Contents/Info.plist")
    );
    assert_eq!(log.len(), 1);
    assert!(matches!(&log.actions[0], MergeAction::Appended { id, .. } if id == "Lilu.kext"));
  }

  #[test]
  fn reapplying_kexts_does_not_duplicate() {
    let mut root = sample_template();
    let cs = parse("kexts:\n  - bundle: Lilu.kext\n    exec: Lilu\n");

    apply_changeset(&mut root, &cs).unwrap();
    let log = apply_changeset(&mut root, &cs).unwrap();

    assert_eq!(kernel_add(&root).len(), 1);
    assert!(matches!(&log.actions[0], MergeAction::Replaced { id, .. } if id == "Lilu.kext"));
  }

  #[test]
  fn upsert_preserves_position() {
    let mut root = sample_template();
    let cs = parse(
      "kexts:\n  - bundle: Lilu.kext\n    exec: Lilu\n  - bundle: VirtualSMC.kext\n    exec: VirtualSMC\n",
    );
    apply_changeset(&mut root, &cs).unwrap();

    // Replace the first entry; it must keep its slot.
    let update = parse("kexts:\n  - bundle: Lilu.kext\n    exec: Lilu\n    enabled: false\n");
    apply_changeset(&mut root, &update).unwrap();

    let add = kernel_add(&root);
    assert_eq!(add.len(), 2);
    let first = add[0].as_dictionary().unwrap();
    assert_eq!(first.get("BundlePath").and_then(Value::as_string), Some("Lilu.kext"));
    assert_eq!(first.get("Enabled").and_then(Value::as_boolean), Some(false));
  }

  #[test]
  fn engine_is_idempotent() {
    let yaml = r#"
kexts:
  - bundle: Lilu.kext
    exec: Lilu
booter_quirks:
  AvoidRuntimeDefrag: true
boot_args: "-v"
csr_active_config: "67000000"
smbios:
  SystemSerialNumber: F5KFV03CP7QM
tools:
  - Name: OpenShell
    Path: OpenShell.efi
device_properties:
  PciRoot(0x0)/Pci(0x1f,0x3):
    layout-id: 7
"#;
    let cs = parse(yaml);

    let mut once = sample_template();
    apply_changeset(&mut once, &cs).unwrap();

    let mut twice = sample_template();
    apply_changeset(&mut twice, &cs).unwrap();
    apply_changeset(&mut twice, &cs).unwrap();

    assert_eq!(once, twice);
  }

  #[test]
  fn unknown_booter_quirk_is_a_schema_error() {
    let mut root = sample_template();
    let cs = parse("booter_quirks:\n  NotARealQuirk: true\n");
    let err = apply_changeset(&mut root, &cs).unwrap_err();
    match err {
      Error::UnknownKey { section, name } => {
        assert_eq!(section, "booter_quirks");
        assert_eq!(name, "NotARealQuirk");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn dummy_power_management_is_rejected_in_kernel_quirks() {
    let mut root = sample_template();
    let cs = parse("kernel_quirks:\n  DummyPowerManagement: true\n");
    let err = apply_changeset(&mut root, &cs).unwrap_err();
    assert!(matches!(err, Error::MisplacedEmulateFlag));

    // ...but accepted where it belongs.
    let cs = parse("kernel_emulate:\n  DummyPowerManagement: true\n");
    apply_changeset(&mut root, &cs).unwrap();
    let emulate = root
      .get("Kernel")
      .and_then(Value::as_dictionary)
      .and_then(|k| k.get("Emulate"))
      .and_then(Value::as_dictionary)
      .unwrap();
    assert_eq!(
      emulate.get("DummyPowerManagement").and_then(Value::as_boolean),
      Some(true)
    );
  }

  #[test]
  fn quirks_absent_from_changeset_keep_base_values() {
    let mut root = sample_template();
    let cs = parse("booter_quirks:\n  AvoidRuntimeDefrag: true\n");
    apply_changeset(&mut root, &cs).unwrap();

    let booter = root
      .get("Booter")
      .and_then(Value::as_dictionary)
      .and_then(|b| b.get("Quirks"))
      .and_then(Value::as_dictionary)
      .unwrap();
    assert_eq!(booter.get("AvoidRuntimeDefrag").and_then(Value::as_boolean), Some(true));
    // Untouched default
    assert_eq!(booter.get("SetupVirtualMap").and_then(Value::as_boolean), Some(true));
  }

  #[test]
  fn boot_args_and_csr_land_in_nvram() {
    let mut root = sample_template();
    let cs = parse("boot_args: \"-v keepsyms=1\"\ncsr_active_config: \"67000000\"\n");
    apply_changeset(&mut root, &cs).unwrap();

    let nvram = nvram_section(&root, BOOT_ARGS_GUID);
    assert_eq!(
      nvram.get("boot-args").and_then(Value::as_string),
      Some("-v keepsyms=1")
    );
    let csr = nvram.get("csr-active-config").and_then(Value::as_data).unwrap();
    assert_eq!(csr, &[0x67, 0x00, 0x00, 0x00]);
    assert_eq!(data::to_hex_upper(csr), "67000000");
  }

  #[test]
  fn smbios_mirrors_identity_into_nvram() {
    let mut root = sample_template();
    let cs = parse(
      "smbios:\n  SystemProductName: iMacPro1,1\n  SystemSerialNumber: F5KFV03CP7QM\n  MLB: F5K828BGGQPGYSMAC\n  SystemUUID: 0FC57E79-1679-4A40-BED5-9E3F73E4D1FB\n  ROM: \"112233445566\"\n",
    );
    let log = apply_changeset(&mut root, &cs).unwrap();

    let generic = root
      .get("PlatformInfo")
      .and_then(Value::as_dictionary)
      .and_then(|p| p.get("Generic"))
      .and_then(Value::as_dictionary)
      .unwrap();
    assert_eq!(
      generic.get("SystemSerialNumber").and_then(Value::as_string),
      Some("F5KFV03CP7QM")
    );
    assert_eq!(
      generic.get("ROM").and_then(Value::as_data),
      Some(&[0x11, 0x22, 0x33, 0x44, 0x55, 0x66][..])
    );

    let mirror = nvram_section(&root, PLATFORM_GUID);
    assert_eq!(
      mirror.get("SystemSerialNumber").and_then(Value::as_string),
      Some("F5KFV03CP7QM")
    );
    assert_eq!(mirror.get("MLB").and_then(Value::as_string), Some("F5K828BGGQPGYSMAC"));
    assert_eq!(
      mirror.get("SystemUUID").and_then(Value::as_string),
      Some("0FC57E79-1679-4A40-BED5-9E3F73E4D1FB")
    );
    // Product name and ROM are identity-block only.
    assert!(!mirror.contains_key("SystemProductName"));
    assert!(!mirror.contains_key("ROM"));

    assert!(log.has_nvram_copy("SystemSerialNumber"));
    assert!(log.has_nvram_copy("MLB"));
    assert!(log.has_nvram_copy("SystemUUID"));
  }

  #[test]
  fn device_properties_merge_preserves_existing_keys() {
    let mut root = sample_template();
    let first = parse(
      "device_properties:\n  PciRoot(0x0)/Pci(0x1f,0x3):\n    layout-id: 7\n    device-id: \"0x70A10000\"\n",
    );
    apply_changeset(&mut root, &first).unwrap();

    // Adding one property must not drop the others.
    let second = parse("device_properties:\n  PciRoot(0x0)/Pci(0x1f,0x3):\n    layout-id: 11\n");
    apply_changeset(&mut root, &second).unwrap();

    let device = root
      .get("DeviceProperties")
      .and_then(Value::as_dictionary)
      .and_then(|d| d.get("Add"))
      .and_then(Value::as_dictionary)
      .and_then(|a| a.get("PciRoot(0x0)/Pci(0x1f,0x3)"))
      .and_then(Value::as_dictionary)
      .unwrap();
    assert_eq!(
      device.get("layout-id").and_then(Value::as_signed_integer),
      Some(11)
    );
    assert_eq!(
      device.get("device-id").and_then(Value::as_data),
      Some(&[0x70, 0xA1, 0x00, 0x00][..])
    );
  }

  #[test]
  fn security_scalars_overwrite() {
    let mut root = sample_template();
    let cs = parse("secureboot_model: Disabled\nvault: Optional\nscan_policy: 0\n");
    apply_changeset(&mut root, &cs).unwrap();

    let security = root
      .get("Misc")
      .and_then(Value::as_dictionary)
      .and_then(|m| m.get("Security"))
      .and_then(Value::as_dictionary)
      .unwrap();
    assert_eq!(
      security.get("SecureBootModel").and_then(Value::as_string),
      Some("Disabled")
    );
    assert_eq!(security.get("Vault").and_then(Value::as_string), Some("Optional"));
    assert_eq!(security.get("ScanPolicy").and_then(Value::as_signed_integer), Some(0));
  }

  #[test]
  fn acpi_and_drivers_and_tools_upsert() {
    let mut root = sample_template();
    let cs = parse(
      "acpi_add:\n  - SSDT-EC.aml\nuefi_drivers:\n  - path: OpenRuntime.efi\ntools:\n  - Name: OpenShell\n    Path: OpenShell.efi\n    Auxiliary: true\n",
    );
    apply_changeset(&mut root, &cs).unwrap();
    apply_changeset(&mut root, &cs).unwrap();

    let acpi = root
      .get("ACPI")
      .and_then(Value::as_dictionary)
      .and_then(|a| a.get("Add"))
      .and_then(Value::as_array)
      .unwrap();
    assert_eq!(acpi.len(), 1);

    let drivers = root
      .get("UEFI")
      .and_then(Value::as_dictionary)
      .and_then(|u| u.get("Drivers"))
      .and_then(Value::as_array)
      .unwrap();
    assert_eq!(drivers.len(), 1);

    let tools = root
      .get("Misc")
      .and_then(Value::as_dictionary)
      .and_then(|m| m.get("Tools"))
      .and_then(Value::as_array)
      .unwrap();
    assert_eq!(tools.len(), 1);
    let tool = tools[0].as_dictionary().unwrap();
    assert_eq!(tool.get("Flavour").and_then(Value::as_string), Some("Auto"));
    assert_eq!(tool.get("Auxiliary").and_then(Value::as_boolean), Some(true));
  }

  #[test]
  fn kernel_patch_binary_fields_become_data() {
    let mut root = sample_template();
    let cs = parse(
      "kernel_patches:\n  - Comment: \"algrey - cpuid\"\n    Find: \"0F22D8\"\n    Replace: [15, 34, 216]\n",
    );
    apply_changeset(&mut root, &cs).unwrap();

    let patches = root
      .get("Kernel")
      .and_then(Value::as_dictionary)
      .and_then(|k| k.get("Patch"))
      .and_then(Value::as_array)
      .unwrap();
    assert_eq!(patches.len(), 1);
    let patch = patches[0].as_dictionary().unwrap();
    assert_eq!(
      patch.get("Find").and_then(Value::as_data),
      Some(&[0x0F, 0x22, 0xD8][..])
    );
    assert_eq!(
      patch.get("Replace").and_then(Value::as_data),
      Some(&[0x0F, 0x22, 0xD8][..])
    );
    // Absent masks serialize as empty data, not missing keys.
    assert_eq!(patch.get("Mask").and_then(Value::as_data), Some(&[][..]));
  }

  #[test]
  fn empty_changeset_is_a_no_op() {
    let mut root = sample_template();
    let before = root.clone();
    let log = apply_changeset(&mut root, &Changeset::default()).unwrap();
    assert!(log.is_empty());
    assert_eq!(root, before);
  }
}
