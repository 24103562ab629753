//! Ordered record of the actions a merge performed.
//!
//! The log is the dry-run preview and the thing tests assert against: every
//! insertion, replacement, and derived copy the engine makes lands here in
//! application order.

use std::fmt;

use serde::Serialize;

/// One applied merge action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MergeAction {
  /// A scalar was set at `path`.
  Set { path: String, value: String },
  /// A key inside a flat map at `path` was overwritten.
  Merged { path: String, key: String },
  /// An identified list entry was replaced in place.
  Replaced { path: String, id: String },
  /// An identified list entry was appended.
  Appended { path: String, id: String },
  /// An SMBIOS identity field was mirrored into the NVRAM platform section.
  NvramCopy { field: String },
}

impl fmt::Display for MergeAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      MergeAction::Set { path, value } => write!(f, "set {path} = {value}"),
      MergeAction::Merged { path, key } => write!(f, "merged {path}.{key}"),
      MergeAction::Replaced { path, id } => write!(f, "replaced {id} in {path}"),
      MergeAction::Appended { path, id } => write!(f, "appended {id} to {path}"),
      MergeAction::NvramCopy { field } => write!(f, "NVRAM copy performed for {field}"),
    }
  }
}

/// The ordered action log of one merge.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeLog {
  pub actions: Vec<MergeAction>,
}

impl MergeLog {
  pub fn push(&mut self, action: MergeAction) {
    self.actions.push(action);
  }

  pub fn len(&self) -> usize {
    self.actions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.actions.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &MergeAction> {
    self.actions.iter()
  }

  /// True when the log records an NVRAM mirror copy for `field`.
  pub fn has_nvram_copy(&self, field: &str) -> bool {
    self
      .actions
      .iter()
      .any(|a| matches!(a, MergeAction::NvramCopy { field: f } if f == field))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_is_human_readable() {
    let action = MergeAction::NvramCopy {
      field: "SystemSerialNumber".to_string(),
    };
    assert_eq!(action.to_string(), "NVRAM copy performed for SystemSerialNumber");
  }

  #[test]
  fn nvram_copy_lookup() {
    let mut log = MergeLog::default();
    log.push(MergeAction::NvramCopy {
      field: "MLB".to_string(),
    });
    assert!(log.has_nvram_copy("MLB"));
    assert!(!log.has_nvram_copy("SystemUUID"));
  }
}
