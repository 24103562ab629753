//! Building a bootable image from an applied changeset.
//!
//! The build pipeline reuses the apply pipeline, then shapes the EFI tree
//! to match the changeset (pruning kexts that are fetched but unused) and
//! wraps the result in an El Torito bootable ISO.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{info, warn};

use crate::apply::{self, ApplyOptions};
use crate::assets::{self, Sources};
use crate::changeset::Changeset;
use crate::error::{Error, Result};
use crate::paths::Layout;
use crate::validate;

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
  /// Discard the cached assets and fetch everything again.
  pub force: bool,
  /// Assemble the EFI tree but skip the ISO wrapper.
  pub skip_iso: bool,
}

/// Build the bootable image for the named changeset. Returns the path of
/// the resulting ISO, or of the EFI tree when the ISO step is skipped.
pub fn build(layout: &Layout, name: &str, options: BuildOptions) -> Result<PathBuf> {
  let changeset = Changeset::load(&layout.changeset_path(name))?;

  if options.force && layout.build_dir().exists() {
    info!("cleaning previous build");
    fs::remove_dir_all(layout.build_dir())?;
  }

  if options.force || !has_kexts(&layout.kexts_dir()) {
    info!("assets missing, fetching");
    let sources = Sources::load(&layout.sources_path())?;
    assets::fetch_all(layout, &sources)?;
  }

  apply::apply(layout, name, ApplyOptions::default())?;
  prune_kexts(&layout.kexts_dir(), &changeset)?;
  validate::run_ocvalidate(&layout.ocvalidate_path(), &layout.config_output_path())?;

  if options.skip_iso {
    return Ok(layout.efi_dir());
  }
  build_iso(layout)
}

fn has_kexts(kexts_dir: &Path) -> bool {
  let Ok(entries) = fs::read_dir(kexts_dir) else {
    return false;
  };
  entries
    .flatten()
    .any(|e| e.file_name().to_string_lossy().ends_with(".kext"))
}

/// Remove fetched kexts the changeset does not reference, and require that
/// every referenced kext is actually present.
pub fn prune_kexts(kexts_dir: &Path, changeset: &Changeset) -> Result<()> {
  let wanted: Vec<&str> = changeset.kexts.iter().map(|k| k.bundle.as_str()).collect();

  if kexts_dir.exists() {
    for entry in fs::read_dir(kexts_dir)? {
      let entry = entry?;
      let file_name = entry.file_name();
      let bundle = file_name.to_string_lossy();
      if !entry.file_type()?.is_dir() || !bundle.ends_with(".kext") {
        continue;
      }
      if !wanted.contains(&bundle.as_ref()) {
        info!("removing unused kext {bundle}");
        fs::remove_dir_all(entry.path())?;
      }
    }
  }

  let missing: Vec<&str> = wanted
    .iter()
    .copied()
    .filter(|bundle| !kexts_dir.join(bundle).is_dir())
    .collect();
  if !missing.is_empty() {
    return Err(Error::Asset(format!(
      "missing required kexts: {}",
      missing.join(", ")
    )));
  }
  Ok(())
}

/// Wrap the EFI tree in an EFI-bootable ISO.
pub fn build_iso(layout: &Layout) -> Result<PathBuf> {
  let efi_root = layout
    .efi_dir()
    .parent()
    .map(Path::to_path_buf)
    .ok_or_else(|| Error::MissingFile(layout.efi_dir()))?;
  if !efi_root.join("EFI/BOOT/BOOTx64.efi").exists() {
    return Err(Error::MissingFile(efi_root.join("EFI/BOOT/BOOTx64.efi")));
  }

  let iso = layout.iso_path();
  if iso.exists() {
    fs::remove_file(&iso)?;
  }

  // Stage in a scratch directory next to the output so a failed tool run
  // never leaves a partial ISO behind, and the final rename stays on one
  // filesystem.
  fs::create_dir_all(layout.out_dir())?;
  let staging = tempfile::Builder::new()
    .prefix("iso-staging")
    .tempdir_in(layout.out_dir())?;
  let staged = staging.path().join("opencore.iso");

  let mut command = iso_command(&efi_root, &staged);
  info!("building ISO with {:?}", command.get_program());
  let status = command.status()?;
  if !status.success() {
    return Err(Error::CommandFailed {
      program: command.get_program().to_string_lossy().into_owned(),
      status,
    });
  }

  if !staged.exists() {
    warn!("ISO tool reported success but produced no file");
    return Err(Error::MissingFile(iso));
  }
  fs::rename(&staged, &iso)?;
  info!(path = %iso.display(), "ISO ready");
  Ok(iso)
}

#[cfg(target_os = "macos")]
fn iso_command(efi_root: &Path, iso: &Path) -> Command {
  let mut command = Command::new("hdiutil");
  command
    .arg("makehybrid")
    .arg("-iso")
    .arg("-joliet")
    .args(["-default-volume-name", "OPENCORE"])
    .arg("-o")
    .arg(iso)
    .arg(efi_root);
  command
}

#[cfg(not(target_os = "macos"))]
fn iso_command(efi_root: &Path, iso: &Path) -> Command {
  let mut command = Command::new("xorriso");
  command
    .args(["-as", "mkisofs", "-V", "OPENCORE", "-efi-boot-part", "--efi-boot-image"])
    .args(["-e", "EFI/BOOT/BOOTx64.efi", "-no-emul-boot"])
    .arg("-o")
    .arg(iso)
    .arg(efi_root);
  command
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn fake_kext(dir: &Path, bundle: &str) {
    fs::create_dir_all(dir.join(bundle).join("Contents")).unwrap();
    fs::write(dir.join(bundle).join("Contents/Info.plist"), "plist").unwrap();
  }

  #[test]
  fn prune_removes_unreferenced_kexts() {
    let dir = TempDir::new().unwrap();
    fake_kext(dir.path(), "Lilu.kext");
    fake_kext(dir.path(), "WhateverGreen.kext");

    let changeset = Changeset::from_yaml("kexts:\n  - bundle: Lilu.kext\n").unwrap();
    prune_kexts(dir.path(), &changeset).unwrap();

    assert!(dir.path().join("Lilu.kext").exists());
    assert!(!dir.path().join("WhateverGreen.kext").exists());
  }

  #[test]
  fn prune_reports_missing_kexts() {
    let dir = TempDir::new().unwrap();
    fake_kext(dir.path(), "Lilu.kext");

    let changeset =
      Changeset::from_yaml("kexts:\n  - bundle: Lilu.kext\n  - bundle: VirtualSMC.kext\n").unwrap();
    let err = prune_kexts(dir.path(), &changeset).unwrap_err();
    assert!(err.to_string().contains("VirtualSMC.kext"));
    // The referenced kext that was present survives the failed check.
    assert!(dir.path().join("Lilu.kext").exists());
  }

  #[test]
  fn prune_ignores_loose_files() {
    let dir = TempDir::new().unwrap();
    fake_kext(dir.path(), "Lilu.kext");
    fs::write(dir.path().join(".DS_Store"), "junk").unwrap();

    let changeset = Changeset::from_yaml("kexts:\n  - bundle: Lilu.kext\n").unwrap();
    prune_kexts(dir.path(), &changeset).unwrap();
    assert!(dir.path().join(".DS_Store").exists());
  }

  #[test]
  fn iso_build_requires_boot_file() {
    let dir = TempDir::new().unwrap();
    let layout = Layout::new(dir.path());
    fs::create_dir_all(layout.efi_dir()).unwrap();
    let err = build_iso(&layout).unwrap_err();
    assert!(matches!(err, Error::MissingFile(_)));
  }
}
