//! Project layout.
//!
//! Every path the tool touches hangs off a single project root: the base
//! template under `efi-template/`, changesets and source manifests under
//! `config/`, and all generated content under `out/` so `clean` can remove
//! one directory.

use std::fs;
use std::path::{Path, PathBuf};

/// Resolved directory layout for one project root.
#[derive(Debug, Clone)]
pub struct Layout {
  root: PathBuf,
}

impl Layout {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn changesets_dir(&self) -> PathBuf {
    self.root.join("config").join("changesets")
  }

  /// Path for a changeset given either a bare name or a name with
  /// extension. Bare names resolve to `.yaml`, or `.yml` when only that
  /// spelling exists.
  pub fn changeset_path(&self, name: &str) -> PathBuf {
    if name.ends_with(".yaml") || name.ends_with(".yml") {
      return self.changesets_dir().join(name);
    }
    let yaml = self.changesets_dir().join(format!("{name}.yaml"));
    if yaml.exists() {
      return yaml;
    }
    let yml = self.changesets_dir().join(format!("{name}.yml"));
    if yml.exists() { yml } else { yaml }
  }

  pub fn sources_path(&self) -> PathBuf {
    self.root.join("config").join("sources.json")
  }

  pub fn deploy_config_path(&self) -> PathBuf {
    self.root.join("config").join("deploy.yaml")
  }

  pub fn template_path(&self) -> PathBuf {
    self
      .root
      .join("efi-template")
      .join("EFI")
      .join("OC")
      .join("config.plist")
  }

  pub fn out_dir(&self) -> PathBuf {
    self.root.join("out")
  }

  pub fn cache_dir(&self) -> PathBuf {
    self.out_dir().join("cache")
  }

  pub fn build_dir(&self) -> PathBuf {
    self.out_dir().join("build")
  }

  /// Root of the assembled EFI tree (`out/build/efi/EFI`).
  pub fn efi_dir(&self) -> PathBuf {
    self.build_dir().join("efi").join("EFI")
  }

  pub fn oc_dir(&self) -> PathBuf {
    self.efi_dir().join("OC")
  }

  pub fn boot_dir(&self) -> PathBuf {
    self.efi_dir().join("BOOT")
  }

  pub fn kexts_dir(&self) -> PathBuf {
    self.oc_dir().join("Kexts")
  }

  pub fn drivers_dir(&self) -> PathBuf {
    self.oc_dir().join("Drivers")
  }

  pub fn tools_dir(&self) -> PathBuf {
    self.oc_dir().join("Tools")
  }

  pub fn acpi_dir(&self) -> PathBuf {
    self.oc_dir().join("ACPI")
  }

  /// Destination of the merged configuration.
  pub fn config_output_path(&self) -> PathBuf {
    self.oc_dir().join("config.plist")
  }

  /// Extracted OpenCore release (binaries and bundled utilities).
  pub fn opencore_dir(&self) -> PathBuf {
    self.out_dir().join("opencore")
  }

  pub fn ocvalidate_path(&self) -> PathBuf {
    self
      .opencore_dir()
      .join("Utilities")
      .join("ocvalidate")
      .join("ocvalidate")
  }

  pub fn macserial_path(&self) -> PathBuf {
    self
      .opencore_dir()
      .join("Utilities")
      .join("macserial")
      .join("macserial")
  }

  pub fn iso_path(&self) -> PathBuf {
    self.out_dir().join("opencore.iso")
  }

  /// Names of the available changesets, sorted, without extension.
  pub fn list_changesets(&self) -> std::io::Result<Vec<String>> {
    let dir = self.changesets_dir();
    if !dir.exists() {
      return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(&dir)? {
      let entry = entry?;
      let path = entry.path();
      if matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml")) {
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
          names.push(stem.to_string());
        }
      }
    }
    names.sort();
    Ok(names)
  }
}
