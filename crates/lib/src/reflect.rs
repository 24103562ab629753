//! The inverse transform: recover a changeset from a merged configuration.
//!
//! Reads a configuration document and produces the changeset that would
//! regenerate it from the base template. Values equal to the release
//! defaults are suppressed, so applying a changeset and reading the result
//! back yields the original semantic content. The `#Generated` marker and
//! any other `#`-prefixed top-level keys are ignored.

use plist::{Dictionary, Value};
use tracing::warn;

use crate::changeset::quirks::{self, FlagDefault};
use crate::changeset::{
  BinaryValue, Changeset, DriverEntry, FlagMap, FlagValue, KernelPatch, KextEntry, PropertyValue,
  Smbios, ToolEntry,
};
use crate::data;
use crate::smbios::{BOOT_ARGS_GUID, MIRRORED_FIELDS, PLATFORM_GUID};

/// Recover the changeset a document encodes relative to the defaults.
pub fn document_to_changeset(root: &Dictionary) -> Changeset {
  let mut changeset = Changeset::default();

  changeset.kexts = read_kexts(root);
  changeset.booter_quirks = read_flags(root, &["Booter", "Quirks"], quirks::BOOTER_QUIRKS);
  changeset.kernel_quirks = read_flags(root, &["Kernel", "Quirks"], quirks::KERNEL_QUIRKS);
  changeset.kernel_emulate = read_flags(root, &["Kernel", "Emulate"], quirks::KERNEL_EMULATE);
  changeset.kernel_patches = read_patches(root);
  changeset.acpi_add = read_acpi(root);
  changeset.acpi_quirks = read_flags(root, &["ACPI", "Quirks"], quirks::ACPI_QUIRKS);
  changeset.boot_args = read_boot_args(root);
  changeset.csr_active_config = read_csr(root);
  changeset.smbios = read_smbios(root);
  changeset.device_properties = read_device_properties(root);
  changeset.uefi_drivers = read_drivers(root);
  changeset.tools = read_tools(root);
  changeset.misc_boot = read_flags(root, &["Misc", "Boot"], quirks::MISC_BOOT);
  read_security(root, &mut changeset);

  changeset
}

fn walk<'a>(root: &'a Dictionary, path: &[&str]) -> Option<&'a Value> {
  let (first, rest) = path.split_first()?;
  let mut current = root.get(first)?;
  for key in rest {
    current = current.as_dictionary()?.get(key)?;
  }
  Some(current)
}

fn array<'a>(root: &'a Dictionary, path: &[&str]) -> &'a [Value] {
  walk(root, path).and_then(Value::as_array).map_or(&[], Vec::as_slice)
}

fn str_field(entry: &Dictionary, key: &str) -> String {
  entry
    .get(key)
    .and_then(Value::as_string)
    .unwrap_or_default()
    .to_string()
}

fn bool_field(entry: &Dictionary, key: &str, default: bool) -> bool {
  entry.get(key).and_then(Value::as_boolean).unwrap_or(default)
}

fn int_field(entry: &Dictionary, key: &str) -> i64 {
  entry.get(key).and_then(Value::as_signed_integer).unwrap_or(0)
}

fn data_field(entry: &Dictionary, key: &str) -> Vec<u8> {
  entry
    .get(key)
    .and_then(Value::as_data)
    .map(<[u8]>::to_vec)
    .unwrap_or_default()
}

/// Flags that differ from the release defaults.
fn read_flags(root: &Dictionary, path: &[&str], table: &[(&str, FlagDefault)]) -> FlagMap {
  let mut flags = FlagMap::new();
  let Some(dict) = walk(root, path).and_then(Value::as_dictionary) else {
    return flags;
  };
  for (name, value) in dict {
    let Some(default) = quirks::lookup(table, name) else {
      warn!(key = %name, path = path.join("."), "unrecognized flag in document, skipping");
      continue;
    };
    if default.matches(value) {
      continue;
    }
    if let Some(flag) = FlagValue::from_plist(value) {
      flags.insert(name.clone(), flag);
    }
  }
  flags
}

fn read_kexts(root: &Dictionary) -> Vec<KextEntry> {
  array(root, &["Kernel", "Add"])
    .iter()
    .filter_map(Value::as_dictionary)
    .map(|entry| {
      let exec = str_field(entry, "ExecutablePath");
      KextEntry {
        bundle: str_field(entry, "BundlePath"),
        exec: exec
          .strip_prefix("Contents/MacOS/")
          .filter(|name| !name.is_empty())
          .map(str::to_string),
        enabled: bool_field(entry, "Enabled", true),
      }
    })
    .collect()
}

fn read_patches(root: &Dictionary) -> Vec<KernelPatch> {
  array(root, &["Kernel", "Patch"])
    .iter()
    .filter_map(Value::as_dictionary)
    .map(|entry| {
      let mask = data_field(entry, "Mask");
      let replace_mask = data_field(entry, "ReplaceMask");
      KernelPatch {
        comment: str_field(entry, "Comment"),
        identifier: {
          let id = str_field(entry, "Identifier");
          if id.is_empty() { "kernel".to_string() } else { id }
        },
        enabled: bool_field(entry, "Enabled", true),
        find: BinaryValue::Encoded(data::to_hex_upper(&data_field(entry, "Find"))),
        replace: BinaryValue::Encoded(data::to_hex_upper(&data_field(entry, "Replace"))),
        mask: (!mask.is_empty()).then(|| BinaryValue::Encoded(data::to_hex_upper(&mask))),
        replace_mask: (!replace_mask.is_empty())
          .then(|| BinaryValue::Encoded(data::to_hex_upper(&replace_mask))),
        count: int_field(entry, "Count"),
        limit: int_field(entry, "Limit"),
        skip: int_field(entry, "Skip"),
        min_kernel: str_field(entry, "MinKernel"),
        max_kernel: str_field(entry, "MaxKernel"),
        arch: {
          let arch = str_field(entry, "Arch");
          if arch.is_empty() { "Any".to_string() } else { arch }
        },
      }
    })
    .collect()
}

fn read_acpi(root: &Dictionary) -> Vec<String> {
  array(root, &["ACPI", "Add"])
    .iter()
    .filter_map(Value::as_dictionary)
    .filter(|entry| bool_field(entry, "Enabled", true))
    .map(|entry| str_field(entry, "Path"))
    .collect()
}

fn read_boot_args(root: &Dictionary) -> Option<String> {
  walk(root, &["NVRAM", "Add", BOOT_ARGS_GUID, "boot-args"])
    .and_then(Value::as_string)
    .filter(|args| !args.is_empty())
    .map(str::to_string)
}

fn read_csr(root: &Dictionary) -> Option<String> {
  walk(root, &["NVRAM", "Add", BOOT_ARGS_GUID, "csr-active-config"])
    .and_then(Value::as_data)
    .filter(|bytes| *bytes != quirks::CSR_DEFAULT)
    .map(data::to_hex_upper)
}

fn read_smbios(root: &Dictionary) -> Option<Smbios> {
  let generic = walk(root, &["PlatformInfo", "Generic"]).and_then(Value::as_dictionary)?;

  let non_empty = |key: &str| {
    generic
      .get(key)
      .and_then(Value::as_string)
      .filter(|s| !s.is_empty())
      .map(str::to_string)
  };
  let rom = generic
    .get("ROM")
    .and_then(Value::as_data)
    .filter(|bytes| !bytes.is_empty())
    .map(|bytes| BinaryValue::Encoded(data::to_hex_upper(bytes)));

  let smbios = Smbios {
    product_name: non_empty("SystemProductName"),
    serial: non_empty("SystemSerialNumber"),
    mlb: non_empty("MLB"),
    uuid: non_empty("SystemUUID"),
    rom,
  };

  check_mirror(root, &smbios);

  if smbios.is_empty() { None } else { Some(smbios) }
}

/// The platform identity block and its runtime-variable mirror must agree;
/// the mirror collapses into the single `smbios` section on read.
fn check_mirror(root: &Dictionary, smbios: &Smbios) {
  let Some(mirror) = walk(root, &["NVRAM", "Add", PLATFORM_GUID]).and_then(Value::as_dictionary)
  else {
    return;
  };
  for field in MIRRORED_FIELDS {
    let mirrored = mirror.get(field).and_then(Value::as_string);
    let generic = match *field {
      "SystemSerialNumber" => smbios.serial.as_deref(),
      "MLB" => smbios.mlb.as_deref(),
      "SystemUUID" => smbios.uuid.as_deref(),
      _ => None,
    };
    if let Some(mirrored) = mirrored {
      if generic != Some(mirrored) {
        warn!(
          field,
          mirrored,
          platform = generic.unwrap_or(""),
          "NVRAM mirror disagrees with platform identity"
        );
      }
    }
  }
}

fn read_device_properties(
  root: &Dictionary,
) -> std::collections::BTreeMap<String, std::collections::BTreeMap<String, PropertyValue>> {
  let mut properties = std::collections::BTreeMap::new();
  let Some(add) = walk(root, &["DeviceProperties", "Add"]).and_then(Value::as_dictionary) else {
    return properties;
  };
  for (device, value) in add {
    let Some(dict) = value.as_dictionary() else {
      continue;
    };
    let mut entries = std::collections::BTreeMap::new();
    for (key, value) in dict {
      let property = match value {
        Value::Integer(i) => i.as_signed().map(PropertyValue::Int),
        Value::Data(bytes) => Some(PropertyValue::Text(format!(
          "0x{}",
          data::to_hex_upper(bytes)
        ))),
        Value::String(s) => Some(PropertyValue::Text(s.clone())),
        _ => {
          warn!(device = %device, key = %key, "unsupported device property type, skipping");
          None
        }
      };
      if let Some(property) = property {
        entries.insert(key.clone(), property);
      }
    }
    if !entries.is_empty() {
      properties.insert(device.clone(), entries);
    }
  }
  properties
}

fn read_drivers(root: &Dictionary) -> Vec<DriverEntry> {
  array(root, &["UEFI", "Drivers"])
    .iter()
    .filter_map(Value::as_dictionary)
    .map(|entry| DriverEntry {
      path: str_field(entry, "Path"),
      enabled: bool_field(entry, "Enabled", true),
      load_early: bool_field(entry, "LoadEarly", false),
      arguments: str_field(entry, "Arguments"),
      comment: str_field(entry, "Comment"),
    })
    .collect()
}

fn read_tools(root: &Dictionary) -> Vec<ToolEntry> {
  array(root, &["Misc", "Tools"])
    .iter()
    .filter_map(Value::as_dictionary)
    .map(|entry| ToolEntry {
      name: str_field(entry, "Name"),
      path: str_field(entry, "Path"),
      enabled: bool_field(entry, "Enabled", true),
      auxiliary: bool_field(entry, "Auxiliary", false),
    })
    .collect()
}

fn read_security(root: &Dictionary, changeset: &mut Changeset) {
  let Some(security) = walk(root, &["Misc", "Security"]).and_then(Value::as_dictionary) else {
    return;
  };
  let differs = |key: &str, value: &Value| {
    quirks::lookup(quirks::MISC_SECURITY, key).is_some_and(|default| !default.matches(value))
  };

  if let Some(value @ Value::String(model)) = security.get("SecureBootModel") {
    if differs("SecureBootModel", value) {
      changeset.secureboot_model = Some(model.clone());
    }
  }
  if let Some(value @ Value::String(vault)) = security.get("Vault") {
    if differs("Vault", value) {
      changeset.vault = Some(vault.clone());
    }
  }
  if let Some(value @ Value::Integer(policy)) = security.get("ScanPolicy") {
    if differs("ScanPolicy", value) {
      changeset.scan_policy = policy.as_signed();
    }
  }
}
