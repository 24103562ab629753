//! Error types for ocforge-lib.

use std::path::PathBuf;

use thiserror::Error;

use crate::validate::Violation;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while merging, validating, or orchestrating.
#[derive(Debug, Error)]
pub enum Error {
  #[error("failed to parse changeset: {0}")]
  ChangesetParse(#[from] serde_yaml::Error),

  #[error("unknown {section} key: {name}")]
  UnknownKey { section: &'static str, name: String },

  #[error("DummyPowerManagement belongs in kernel_emulate, not kernel_quirks")]
  MisplacedEmulateFlag,

  #[error("invalid {field} encoding '{value}': {reason}")]
  Encoding {
    field: String,
    value: String,
    reason: String,
  },

  #[error("configuration validation failed:\n{}", render_violations(.0))]
  Validation(Vec<Violation>),

  #[error("file not found: {0}")]
  MissingFile(PathBuf),

  #[error("template root is not a dictionary: {0}")]
  MalformedTemplate(PathBuf),

  #[error("plist error: {0}")]
  Plist(#[from] plist::Error),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("archive error: {0}")]
  Zip(#[from] zip::result::ZipError),

  #[error("hash mismatch for {name}: expected {expected}, got {actual}")]
  HashMismatch {
    name: String,
    expected: String,
    actual: String,
  },

  #[error("{program} exited with {status}")]
  CommandFailed { program: String, status: std::process::ExitStatus },

  #[error("{0}")]
  Asset(String),
}

fn render_violations(violations: &[Violation]) -> String {
  violations
    .iter()
    .map(|v| format!("  - {v}"))
    .collect::<Vec<_>>()
    .join("\n")
}
