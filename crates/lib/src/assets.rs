//! Fetching bootloader assets: the OpenCore release, kexts, and drivers.
//!
//! Downloads are cached under `out/cache` keyed by file name, so repeat
//! fetches are offline. Everything lands in the build tree laid out by
//! [`Layout`]; the merge pipeline never touches the network.

use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::paths::Layout;

/// The `config/sources.json` document: where assets come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Sources {
  pub opencore: OpenCoreSource,
  #[serde(default)]
  pub kexts: Vec<KextSource>,
  #[serde(default)]
  pub drivers: Vec<DriverSource>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenCoreSource {
  pub repo: String,
  pub version: String,
  #[serde(default)]
  pub sha256: Option<String>,
}

impl OpenCoreSource {
  pub fn release_asset(&self) -> String {
    format!("OpenCore-{}-RELEASE.zip", self.version)
  }

  pub fn release_url(&self) -> String {
    format!(
      "https://github.com/{}/releases/download/{}/{}",
      self.repo,
      self.version,
      self.release_asset()
    )
  }
}

/// A kext pulled from a GitHub release zip.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KextSource {
  /// Bundle name, e.g. `Lilu.kext`.
  pub name: String,
  pub repo: String,
  pub version: String,
  /// Release asset file name, e.g. `Lilu-1.7.1-RELEASE.zip`.
  pub asset: String,
  #[serde(default)]
  pub sha256: Option<String>,
}

impl KextSource {
  pub fn release_url(&self) -> String {
    format!(
      "https://github.com/{}/releases/download/{}/{}",
      self.repo, self.version, self.asset
    )
  }
}

/// A standalone driver fetched from a direct URL.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverSource {
  /// File name under `Drivers/`, e.g. `HfsPlus.efi`.
  pub name: String,
  pub url: String,
  #[serde(default)]
  pub sha256: Option<String>,
}

impl Sources {
  pub fn load(path: &Path) -> Result<Self> {
    if !path.exists() {
      return Err(Error::MissingFile(path.to_path_buf()));
    }
    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file))
      .map_err(|e| Error::Asset(format!("invalid sources file {}: {e}", path.display())))
  }
}

/// Fetch a URL into `dest`, verifying the SHA256 hash when one is given.
pub fn fetch_url(url: &str, dest: &Path, expected_sha256: Option<&str>) -> Result<()> {
  info!("fetching {url}");

  if let Some(parent) = dest.parent() {
    fs::create_dir_all(parent)?;
  }

  let response = reqwest::blocking::get(url)?.error_for_status()?;
  let bytes = response.bytes()?;

  if let Some(expected) = expected_sha256 {
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let actual = hex::encode(hasher.finalize());
    if actual != expected {
      return Err(Error::HashMismatch {
        name: url.to_string(),
        expected: expected.to_string(),
        actual,
      });
    }
    debug!("hash verified: {expected}");
  }

  let mut file = File::create(dest)?;
  file.write_all(&bytes)?;
  info!("downloaded to {}", dest.display());
  Ok(())
}

/// Download into the cache, or reuse what is already there.
fn cached_fetch(layout: &Layout, url: &str, file_name: &str, sha256: Option<&str>) -> Result<PathBuf> {
  let cached = layout.cache_dir().join(file_name);
  if cached.exists() {
    debug!("using cached {file_name}");
    return Ok(cached);
  }
  fetch_url(url, &cached, sha256)?;
  Ok(cached)
}

/// Unpack a zip archive to `dest`, entry paths preserved. Executable bits
/// survive on Unix.
pub fn unpack_zip(archive_path: &Path, dest: &Path) -> Result<()> {
  let file = File::open(archive_path)?;
  let mut archive = zip::ZipArchive::new(BufReader::new(file))?;

  fs::create_dir_all(dest)?;
  for i in 0..archive.len() {
    let mut entry = archive.by_index(i)?;
    let Some(path) = entry.enclosed_name() else {
      return Err(Error::Asset(format!(
        "unsafe entry name in {}",
        archive_path.display()
      )));
    };
    let dest_path = dest.join(path);

    if entry.is_dir() {
      fs::create_dir_all(&dest_path)?;
    } else {
      if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent)?;
      }
      let mut outfile = File::create(&dest_path)?;
      std::io::copy(&mut entry, &mut outfile)?;

      #[cfg(unix)]
      {
        use std::os::unix::fs::PermissionsExt;
        if let Some(mode) = entry.unix_mode() {
          fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode))?;
        }
      }
    }
  }
  info!("unpacked to {}", dest.display());
  Ok(())
}

/// Fetch everything the sources file names into the build tree.
pub fn fetch_all(layout: &Layout, sources: &Sources) -> Result<()> {
  fetch_opencore(layout, &sources.opencore)?;
  fetch_kexts(layout, &sources.kexts)?;
  fetch_drivers(layout, &sources.drivers)?;
  info!("assets ready");
  Ok(())
}

/// Fetch the OpenCore release and seed the EFI tree with its binaries.
pub fn fetch_opencore(layout: &Layout, source: &OpenCoreSource) -> Result<()> {
  let archive = cached_fetch(
    layout,
    &source.release_url(),
    &source.release_asset(),
    source.sha256.as_deref(),
  )?;

  let release_dir = layout.opencore_dir();
  if release_dir.exists() {
    fs::remove_dir_all(&release_dir)?;
  }
  unpack_zip(&archive, &release_dir)?;

  // Release zips carry either an X64 or a combined IA32_X64 tree.
  let files_dir = ["X64", "IA32_X64"]
    .iter()
    .map(|arch| release_dir.join(arch))
    .find(|dir| dir.exists())
    .ok_or_else(|| {
      Error::Asset(format!(
        "no firmware tree found in {}",
        release_dir.display()
      ))
    })?;

  for dir in [
    layout.oc_dir(),
    layout.boot_dir(),
    layout.drivers_dir(),
    layout.tools_dir(),
    layout.kexts_dir(),
    layout.acpi_dir(),
  ] {
    fs::create_dir_all(dir)?;
  }

  copy_required(
    &files_dir.join("EFI/OC/OpenCore.efi"),
    &layout.oc_dir().join("OpenCore.efi"),
  )?;
  copy_required(
    &files_dir.join("EFI/BOOT/BOOTx64.efi"),
    &layout.boot_dir().join("BOOTx64.efi"),
  )?;
  copy_required(
    &files_dir.join("EFI/OC/Drivers/OpenRuntime.efi"),
    &layout.drivers_dir().join("OpenRuntime.efi"),
  )?;

  // Picker tools are optional extras; not every build ships them.
  for tool in ["OpenShell.efi", "CleanNvram.efi"] {
    let src = files_dir.join("EFI/OC/Tools").join(tool);
    if src.exists() {
      fs::copy(&src, layout.tools_dir().join(tool))?;
    } else {
      debug!("tool {tool} not present in release");
    }
  }

  for utility in [layout.ocvalidate_path(), layout.macserial_path()] {
    mark_executable(&utility)?;
  }
  Ok(())
}

fn copy_required(src: &Path, dest: &Path) -> Result<()> {
  if !src.exists() {
    return Err(Error::MissingFile(src.to_path_buf()));
  }
  fs::copy(src, dest)?;
  Ok(())
}

fn mark_executable(path: &Path) -> Result<()> {
  if !path.exists() {
    return Ok(());
  }
  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
  }
  Ok(())
}

/// Fetch each kext release and install the named bundle into the EFI tree.
pub fn fetch_kexts(layout: &Layout, kexts: &[KextSource]) -> Result<()> {
  for kext in kexts {
    let archive = cached_fetch(layout, &kext.release_url(), &kext.asset, kext.sha256.as_deref())?;
    install_kext_bundle(&archive, &kext.name, &layout.kexts_dir())?;
  }
  Ok(())
}

/// Extract one `.kext` bundle out of a release zip. Bundles sit either at
/// the archive root or under a `Kexts/` directory; debug symbol bundles
/// are skipped.
fn install_kext_bundle(archive_path: &Path, name: &str, kexts_dir: &Path) -> Result<()> {
  let file = File::open(archive_path)?;
  let mut archive = zip::ZipArchive::new(BufReader::new(file))?;

  let prefixes = [format!("{name}/"), format!("Kexts/{name}/")];
  let mut installed = false;

  for i in 0..archive.len() {
    let mut entry = archive.by_index(i)?;
    let entry_name = entry.name().to_string();
    let Some(relative) = prefixes
      .iter()
      .find_map(|prefix| entry_name.strip_prefix(prefix.as_str()))
    else {
      continue;
    };
    if entry_name.contains(".dSYM") {
      continue;
    }

    let dest_path = kexts_dir.join(name).join(relative);
    if entry.is_dir() {
      fs::create_dir_all(&dest_path)?;
    } else {
      if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent)?;
      }
      let mut outfile = File::create(&dest_path)?;
      std::io::copy(&mut entry, &mut outfile)?;
    }
    installed = true;
  }

  if !installed {
    return Err(Error::Asset(format!(
      "{name} not found in {}",
      archive_path.display()
    )));
  }
  info!("installed {name}");
  Ok(())
}

/// Fetch standalone drivers into the EFI tree.
pub fn fetch_drivers(layout: &Layout, drivers: &[DriverSource]) -> Result<()> {
  if drivers.is_empty() {
    debug!("no extra drivers configured");
    return Ok(());
  }
  fs::create_dir_all(layout.drivers_dir())?;
  for driver in drivers {
    let cached = cached_fetch(layout, &driver.url, &driver.name, driver.sha256.as_deref())?;
    fs::copy(&cached, layout.drivers_dir().join(&driver.name))?;
    info!("installed {}", driver.name);
  }
  Ok(())
}

/// Clear the download cache and unpacked release.
pub fn clean(layout: &Layout) -> Result<u64> {
  let mut removed = 0;
  for dir in [layout.cache_dir(), layout.opencore_dir()] {
    if dir.exists() {
      removed += dir_size(&dir)?;
      fs::remove_dir_all(&dir)?;
    }
  }
  if removed == 0 {
    warn!("nothing to clean");
  }
  Ok(removed)
}

fn dir_size(dir: &Path) -> Result<u64> {
  let mut total = 0;
  for entry in walkdir::WalkDir::new(dir) {
    let entry = entry.map_err(|e| Error::Asset(e.to_string()))?;
    if entry.file_type().is_file() {
      total += entry.metadata().map_err(|e| Error::Asset(e.to_string()))?.len();
    }
  }
  Ok(total)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn zip_with(entries: &[(&str, &[u8])]) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fixture.zip");
    let file = File::create(&path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, contents) in entries {
      if name.ends_with('/') {
        writer.add_directory(name.trim_end_matches('/'), options).unwrap();
      } else {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents).unwrap();
      }
    }
    writer.finish().unwrap();
    (dir, path)
  }

  #[test]
  fn sources_parse_and_reject_unknown_keys() {
    let json = r#"{
      "opencore": {"repo": "acidanthera/OpenCorePkg", "version": "1.0.4"},
      "kexts": [
        {"name": "Lilu.kext", "repo": "acidanthera/Lilu", "version": "1.7.1", "asset": "Lilu-1.7.1-RELEASE.zip"}
      ],
      "drivers": [
        {"name": "HfsPlus.efi", "url": "https://example.invalid/HfsPlus.efi"}
      ]
    }"#;
    let sources: Sources = serde_json::from_str(json).unwrap();
    assert_eq!(
      sources.opencore.release_url(),
      "https://github.com/acidanthera/OpenCorePkg/releases/download/1.0.4/OpenCore-1.0.4-RELEASE.zip"
    );
    assert_eq!(
      sources.kexts[0].release_url(),
      "https://github.com/acidanthera/Lilu/releases/download/1.7.1/Lilu-1.7.1-RELEASE.zip"
    );

    let bad = r#"{"opencore": {"repo": "a/b", "version": "1", "verison": "1"}}"#;
    assert!(serde_json::from_str::<Sources>(bad).is_err());
  }

  #[test]
  fn unpack_zip_preserves_paths() {
    let (_dir, archive) = zip_with(&[
      ("X64/EFI/OC/OpenCore.efi", b"oc".as_slice()),
      ("Docs/Changelog.md", b"log".as_slice()),
    ]);
    let dest = TempDir::new().unwrap();
    unpack_zip(&archive, dest.path()).unwrap();
    assert!(dest.path().join("X64/EFI/OC/OpenCore.efi").exists());
    assert!(dest.path().join("Docs/Changelog.md").exists());
  }

  #[test]
  fn kext_bundle_extracts_from_root_layout() {
    let (_dir, archive) = zip_with(&[
      ("Lilu.kext/Contents/Info.plist", b"plist".as_slice()),
      ("Lilu.kext/Contents/MacOS/Lilu", b"bin".as_slice()),
      ("Lilu.kext.dSYM/Contents/Info.plist", b"sym".as_slice()),
    ]);
    let dest = TempDir::new().unwrap();
    install_kext_bundle(&archive, "Lilu.kext", dest.path()).unwrap();
    assert!(dest.path().join("Lilu.kext/Contents/Info.plist").exists());
    assert!(dest.path().join("Lilu.kext/Contents/MacOS/Lilu").exists());
    assert!(!dest.path().join("Lilu.kext.dSYM").exists());
  }

  #[test]
  fn kext_bundle_extracts_from_nested_layout() {
    let (_dir, archive) = zip_with(&[
      ("Kexts/VirtualSMC.kext/Contents/Info.plist", b"plist".as_slice()),
      ("Kexts/SMCProcessor.kext/Contents/Info.plist", b"other".as_slice()),
    ]);
    let dest = TempDir::new().unwrap();
    install_kext_bundle(&archive, "VirtualSMC.kext", dest.path()).unwrap();
    assert!(dest.path().join("VirtualSMC.kext/Contents/Info.plist").exists());
    assert!(!dest.path().join("SMCProcessor.kext").exists());
  }

  #[test]
  fn missing_kext_in_archive_is_an_error() {
    let (_dir, archive) = zip_with(&[("README.md", b"hi".as_slice())]);
    let dest = TempDir::new().unwrap();
    let err = install_kext_bundle(&archive, "Lilu.kext", dest.path()).unwrap_err();
    assert!(err.to_string().contains("Lilu.kext"));
  }
}
