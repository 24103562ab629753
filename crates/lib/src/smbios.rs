//! SMBIOS identity handling: the NVRAM mirroring rule, placeholder
//! detection, and generation of real identity values via the fetched
//! macserial utility.

use std::path::Path;
use std::process::Command;

use tracing::info;

use crate::changeset::{BinaryValue, Smbios};
use crate::data;
use crate::error::{Error, Result};

/// NVRAM GUID holding boot arguments and `csr-active-config`.
pub const BOOT_ARGS_GUID: &str = "7C436110-AB2A-4BBB-A880-FE41995C9F82";

/// NVRAM GUID of the firmware's platform identity namespace. SMBIOS
/// identity fields are mirrored here so the OS can read them at a fixed
/// location.
pub const PLATFORM_GUID: &str = "4D1EDE05-38C7-4A6A-9CC6-4BCCA8B38C14";

/// The identity fields subject to the mirroring rule.
pub const MIRRORED_FIELDS: &[&str] = &["SystemSerialNumber", "MLB", "SystemUUID"];

const PLACEHOLDER_SERIALS: &[&str] = &["C02XD1WJHX87", "PLACEHOLDER", "XXX"];
const PLACEHOLDER_MLBS: &[&str] = &["C02309XXXXHX87XX", "PLACEHOLDER", "XXX"];
const PLACEHOLDER_UUIDS: &[&str] = &[
  "12345678-1234-1234-1234-123456789ABC",
  "00000000-0000-0000-0000-000000000000",
  "PLACEHOLDER",
];
const PLACEHOLDER_ROMS: &[[u8; 6]] = &[
  [0x11, 0x22, 0x33, 0x44, 0x55, 0x66],
  [0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
  [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
];

pub fn is_placeholder_serial(serial: &str) -> bool {
  serial.trim().is_empty() || PLACEHOLDER_SERIALS.contains(&serial.trim())
}

pub fn is_placeholder_mlb(mlb: &str) -> bool {
  mlb.trim().is_empty() || PLACEHOLDER_MLBS.contains(&mlb.trim())
}

pub fn is_placeholder_uuid(uuid: &str) -> bool {
  uuid.trim().is_empty()
    || PLACEHOLDER_UUIDS
      .iter()
      .any(|p| p.eq_ignore_ascii_case(uuid.trim()))
}

pub fn is_placeholder_rom(rom: &[u8]) -> bool {
  rom.is_empty() || PLACEHOLDER_ROMS.iter().any(|p| p == rom)
}

/// Names of the identity fields that still carry placeholder values.
/// Used to warn before an apply bakes throwaway identity into an image.
pub fn placeholder_fields(smbios: &Smbios) -> Vec<&'static str> {
  let mut fields = Vec::new();
  if smbios.serial.as_deref().is_some_and(is_placeholder_serial) {
    fields.push("SystemSerialNumber");
  }
  if smbios.mlb.as_deref().is_some_and(is_placeholder_mlb) {
    fields.push("MLB");
  }
  if smbios.uuid.as_deref().is_some_and(is_placeholder_uuid) {
    fields.push("SystemUUID");
  }
  if let Some(rom) = &smbios.rom {
    if let Ok(bytes) = rom.decode("ROM") {
      if is_placeholder_rom(&bytes) {
        fields.push("ROM");
      }
    }
  }
  fields
}

/// Model used when the changeset names none.
const DEFAULT_MODEL: &str = "iMacPro1,1";

/// One of Apple's OUIs, used as the prefix of generated ROM values.
const APPLE_OUI: [u8; 3] = [0x00, 0x17, 0xF2];

/// Generate a serial number and MLB for `model` by running the macserial
/// utility shipped with the OpenCore release.
pub fn generate_identity(macserial: &Path, model: &str) -> Result<(String, String)> {
  if !macserial.exists() {
    return Err(Error::MissingFile(macserial.to_path_buf()));
  }
  let output = Command::new(macserial).args(["-a", "-m", model]).output()?;
  if !output.status.success() {
    return Err(Error::CommandFailed {
      program: "macserial".to_string(),
      status: output.status,
    });
  }
  parse_macserial(&String::from_utf8_lossy(&output.stdout))
}

/// macserial prints one `SERIAL | MLB` pair per line; the serial may carry
/// a `Model:` prefix depending on the invocation.
fn parse_macserial(output: &str) -> Result<(String, String)> {
  for line in output.lines() {
    let Some((left, rest)) = line.split_once('|') else {
      continue;
    };
    let serial = left.rsplit(':').next().unwrap_or(left).trim();
    let mlb = rest.split('|').next().unwrap_or(rest).trim();
    if !serial.is_empty() && !mlb.is_empty() {
      return Ok((serial.to_string(), mlb.to_string()));
    }
  }
  Err(Error::Asset(format!(
    "could not parse macserial output: {}",
    output.trim()
  )))
}

fn random_uuid() -> String {
  uuid::Uuid::new_v4().to_string().to_uppercase()
}

fn random_rom() -> Vec<u8> {
  let mut rom = APPLE_OUI.to_vec();
  rom.extend((0..3).map(|_| rand::random::<u8>()));
  rom
}

/// Replace placeholder identity fields with generated values: serial and
/// MLB come from macserial, the UUID and ROM are random. Returns the names
/// of the fields that were filled; with `force` every field is regenerated.
/// macserial is only required when the serial or MLB actually needs it.
pub fn fill_placeholders(
  smbios: &mut Smbios,
  macserial: &Path,
  force: bool,
) -> Result<Vec<&'static str>> {
  let model = smbios
    .product_name
    .clone()
    .unwrap_or_else(|| DEFAULT_MODEL.to_string());
  let mut filled = Vec::new();

  let needs_serial = force || smbios.serial.as_deref().map_or(true, is_placeholder_serial);
  let needs_mlb = force || smbios.mlb.as_deref().map_or(true, is_placeholder_mlb);
  if needs_serial || needs_mlb {
    let (serial, mlb) = generate_identity(macserial, &model)?;
    if needs_serial {
      info!("generated serial {serial} for {model}");
      smbios.serial = Some(serial);
      filled.push("SystemSerialNumber");
    }
    if needs_mlb {
      info!("generated MLB {mlb}");
      smbios.mlb = Some(mlb);
      filled.push("MLB");
    }
  }

  if force || smbios.uuid.as_deref().map_or(true, is_placeholder_uuid) {
    let uuid = random_uuid();
    info!("generated UUID {uuid}");
    smbios.uuid = Some(uuid);
    filled.push("SystemUUID");
  }

  let rom_is_placeholder = match &smbios.rom {
    None => true,
    Some(rom) => is_placeholder_rom(&rom.decode("ROM")?),
  };
  if force || rom_is_placeholder {
    let rom = data::to_hex_upper(&random_rom());
    info!("generated ROM {rom}");
    smbios.rom = Some(BinaryValue::Encoded(rom));
    filled.push("ROM");
  }

  Ok(filled)
}
