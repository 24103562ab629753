//! Conversions between the textual encodings used by changesets and the
//! binary values stored in the configuration document.
//!
//! Changesets express binary fields as hex strings (with or without a `0x`
//! prefix, spaces allowed), base64 strings, or lists of byte-sized integers.
//! All of them must round-trip byte-for-byte.

use crate::error::{Error, Result};

/// Decode a hex string. Accepts spaces as separators and an optional `0x`
/// prefix; odd-length input is an encoding error, not a silent truncation.
pub fn parse_hex(field: &str, text: &str) -> Result<Vec<u8>> {
  let cleaned = text.trim().replace(' ', "");
  let cleaned = cleaned.strip_prefix("0x").unwrap_or(&cleaned);

  if cleaned.len() % 2 != 0 {
    return Err(Error::Encoding {
      field: field.to_string(),
      value: text.to_string(),
      reason: "odd-length hex string".to_string(),
    });
  }

  hex::decode(cleaned).map_err(|e| Error::Encoding {
    field: field.to_string(),
    value: text.to_string(),
    reason: e.to_string(),
  })
}

pub fn to_hex_upper(bytes: &[u8]) -> String {
  hex::encode_upper(bytes)
}

pub fn parse_base64(field: &str, text: &str) -> Result<Vec<u8>> {
  use base64::Engine as _;
  use base64::engine::general_purpose::STANDARD;

  STANDARD.decode(text.trim()).map_err(|e| Error::Encoding {
    field: field.to_string(),
    value: text.to_string(),
    reason: e.to_string(),
  })
}

/// Decode a binary field that may be hex, base64, or already raw bytes.
/// Hex is tried first because every OpenCore guide writes these as hex.
pub fn parse_binary(field: &str, text: &str) -> Result<Vec<u8>> {
  match parse_hex(field, text) {
    Ok(bytes) => Ok(bytes),
    Err(hex_err) => match parse_base64(field, text) {
      Ok(bytes) => Ok(bytes),
      Err(_) => Err(hex_err),
    },
  }
}
