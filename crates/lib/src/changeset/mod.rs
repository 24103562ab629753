//! The changeset document model.
//!
//! A changeset is a YAML document with a fixed set of top-level sections.
//! Unknown sections are rejected at parse time (`deny_unknown_fields`), as
//! are unknown fields inside list entries; quirk *names* inside the flat
//! flag maps are checked against the tables in [`quirks`] during merge.

pub mod quirks;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data;
use crate::error::{Error, Result};

/// A scalar flag value inside a quirk or boot-option map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
  Bool(bool),
  Int(i64),
  Text(String),
}

impl FlagValue {
  pub fn to_plist(&self) -> plist::Value {
    match self {
      FlagValue::Bool(b) => plist::Value::Boolean(*b),
      FlagValue::Int(i) => plist::Value::Integer((*i).into()),
      FlagValue::Text(s) => plist::Value::String(s.clone()),
    }
  }

  pub fn from_plist(value: &plist::Value) -> Option<FlagValue> {
    match value {
      plist::Value::Boolean(b) => Some(FlagValue::Bool(*b)),
      plist::Value::Integer(i) => i.as_signed().map(FlagValue::Int),
      plist::Value::String(s) => Some(FlagValue::Text(s.clone())),
      _ => None,
    }
  }
}

/// A binary field expressed either as a hex/base64 string or a byte list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BinaryValue {
  Bytes(Vec<u8>),
  Encoded(String),
}

impl BinaryValue {
  /// Decode to raw bytes; `field` names the offender in error messages.
  pub fn decode(&self, field: &str) -> Result<Vec<u8>> {
    match self {
      BinaryValue::Bytes(b) => Ok(b.clone()),
      BinaryValue::Encoded(s) => data::parse_binary(field, s),
    }
  }
}

/// A kernel extension to enable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KextEntry {
  pub bundle: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub exec: Option<String>,
  #[serde(default = "default_true", skip_serializing_if = "is_true")]
  pub enabled: bool,
}

/// A UEFI driver to load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverEntry {
  pub path: String,
  #[serde(default = "default_true", skip_serializing_if = "is_true")]
  pub enabled: bool,
  #[serde(default, skip_serializing_if = "is_false")]
  pub load_early: bool,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub arguments: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub comment: String,
}

/// A picker tool entry. Field names match the plist casing, as in the
/// original changeset format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolEntry {
  #[serde(rename = "Name")]
  pub name: String,
  #[serde(rename = "Path")]
  pub path: String,
  #[serde(rename = "Enabled", default = "default_true", skip_serializing_if = "is_true")]
  pub enabled: bool,
  #[serde(rename = "Auxiliary", default, skip_serializing_if = "is_false")]
  pub auxiliary: bool,
}

/// A kernel binary patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KernelPatch {
  #[serde(rename = "Comment")]
  pub comment: String,
  #[serde(rename = "Identifier", default = "default_kernel_identifier")]
  pub identifier: String,
  #[serde(rename = "Enabled", default = "default_true", skip_serializing_if = "is_true")]
  pub enabled: bool,
  #[serde(rename = "Find")]
  pub find: BinaryValue,
  #[serde(rename = "Replace")]
  pub replace: BinaryValue,
  #[serde(rename = "Mask", default, skip_serializing_if = "Option::is_none")]
  pub mask: Option<BinaryValue>,
  #[serde(rename = "ReplaceMask", default, skip_serializing_if = "Option::is_none")]
  pub replace_mask: Option<BinaryValue>,
  #[serde(rename = "Count", default, skip_serializing_if = "is_zero")]
  pub count: i64,
  #[serde(rename = "Limit", default, skip_serializing_if = "is_zero")]
  pub limit: i64,
  #[serde(rename = "Skip", default, skip_serializing_if = "is_zero")]
  pub skip: i64,
  #[serde(rename = "MinKernel", default, skip_serializing_if = "String::is_empty")]
  pub min_kernel: String,
  #[serde(rename = "MaxKernel", default, skip_serializing_if = "String::is_empty")]
  pub max_kernel: String,
  #[serde(rename = "Arch", default = "default_arch")]
  pub arch: String,
}

/// Platform identity fields. Field names match the plist casing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Smbios {
  #[serde(rename = "SystemProductName", default, skip_serializing_if = "Option::is_none")]
  pub product_name: Option<String>,
  #[serde(rename = "SystemSerialNumber", default, skip_serializing_if = "Option::is_none")]
  pub serial: Option<String>,
  #[serde(rename = "MLB", default, skip_serializing_if = "Option::is_none")]
  pub mlb: Option<String>,
  #[serde(rename = "SystemUUID", default, skip_serializing_if = "Option::is_none")]
  pub uuid: Option<String>,
  #[serde(rename = "ROM", default, skip_serializing_if = "Option::is_none")]
  pub rom: Option<BinaryValue>,
}

impl Smbios {
  pub fn is_empty(&self) -> bool {
    self.product_name.is_none()
      && self.serial.is_none()
      && self.mlb.is_none()
      && self.uuid.is_none()
      && self.rom.is_none()
  }
}

/// A property value inside `device_properties`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
  Int(i64),
  Bytes(Vec<u8>),
  Text(String),
}

impl PropertyValue {
  /// Convert to a plist value. `0x`-prefixed strings decode to binary data
  /// so the inverse transform's hex output round-trips.
  pub fn to_plist(&self, field: &str) -> Result<plist::Value> {
    match self {
      PropertyValue::Int(i) => Ok(plist::Value::Integer((*i).into())),
      PropertyValue::Bytes(b) => Ok(plist::Value::Data(b.clone())),
      PropertyValue::Text(s) if s.starts_with("0x") => {
        Ok(plist::Value::Data(data::parse_hex(field, s)?))
      }
      PropertyValue::Text(s) => Ok(plist::Value::String(s.clone())),
    }
  }
}

pub type FlagMap = BTreeMap<String, FlagValue>;
pub type DeviceProperties = BTreeMap<String, BTreeMap<String, PropertyValue>>;

/// A declarative diff against the base configuration template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Changeset {
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub kexts: Vec<KextEntry>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub booter_quirks: FlagMap,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub kernel_quirks: FlagMap,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub kernel_emulate: FlagMap,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub kernel_patches: Vec<KernelPatch>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub acpi_add: Vec<String>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub acpi_quirks: FlagMap,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub boot_args: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub csr_active_config: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub smbios: Option<Smbios>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub device_properties: DeviceProperties,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub uefi_drivers: Vec<DriverEntry>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub tools: Vec<ToolEntry>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub misc_boot: FlagMap,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub secureboot_model: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub vault: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub scan_policy: Option<i64>,
}

impl Changeset {
  pub fn from_yaml(text: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(text)?)
  }

  pub fn to_yaml(&self) -> Result<String> {
    Ok(serde_yaml::to_string(self)?)
  }

  pub fn load(path: &Path) -> Result<Self> {
    if !path.exists() {
      return Err(Error::MissingFile(path.to_path_buf()));
    }
    let text = fs::read_to_string(path)?;
    Self::from_yaml(&text)
  }

  pub fn save(&self, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    fs::write(path, self.to_yaml()?)?;
    Ok(())
  }

  /// One-line description of the changeset for listings.
  pub fn summary(&self) -> Summary {
    Summary {
      kext_count: self.kexts.len(),
      model: self
        .smbios
        .as_ref()
        .and_then(|s| s.product_name.clone()),
      boot_args: self.boot_args.clone(),
      sections: self.section_names(),
    }
  }

  fn section_names(&self) -> Vec<&'static str> {
    let mut names = Vec::new();
    if !self.kexts.is_empty() {
      names.push("kexts");
    }
    if !self.booter_quirks.is_empty() {
      names.push("booter_quirks");
    }
    if !self.kernel_quirks.is_empty() {
      names.push("kernel_quirks");
    }
    if !self.kernel_emulate.is_empty() {
      names.push("kernel_emulate");
    }
    if !self.kernel_patches.is_empty() {
      names.push("kernel_patches");
    }
    if !self.acpi_add.is_empty() {
      names.push("acpi_add");
    }
    if !self.acpi_quirks.is_empty() {
      names.push("acpi_quirks");
    }
    if self.boot_args.is_some() {
      names.push("boot_args");
    }
    if self.csr_active_config.is_some() {
      names.push("csr_active_config");
    }
    if self.smbios.is_some() {
      names.push("smbios");
    }
    if !self.device_properties.is_empty() {
      names.push("device_properties");
    }
    if !self.uefi_drivers.is_empty() {
      names.push("uefi_drivers");
    }
    if !self.tools.is_empty() {
      names.push("tools");
    }
    if !self.misc_boot.is_empty() {
      names.push("misc_boot");
    }
    if self.secureboot_model.is_some() {
      names.push("secureboot_model");
    }
    if self.vault.is_some() {
      names.push("vault");
    }
    if self.scan_policy.is_some() {
      names.push("scan_policy");
    }
    names
  }
}

/// Listing data for one changeset.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
  pub kext_count: usize,
  pub model: Option<String>,
  pub boot_args: Option<String>,
  pub sections: Vec<&'static str>,
}

fn default_true() -> bool {
  true
}

fn default_kernel_identifier() -> String {
  "kernel".to_string()
}

fn default_arch() -> String {
  "Any".to_string()
}

fn is_true(b: &bool) -> bool {
  *b
}

fn is_false(b: &bool) -> bool {
  !*b
}

fn is_zero(i: &i64) -> bool {
  *i == 0
}
