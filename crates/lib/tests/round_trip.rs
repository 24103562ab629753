//! End-to-end pipeline tests: apply to disk, read back, apply again.

use std::fs;

use ocforge_lib::apply::{self, ApplyOptions, GENERATED_KEY};
use ocforge_lib::testutil::write_sample_template;
use ocforge_lib::{Changeset, Layout};
use tempfile::TempDir;

const CHANGESET: &str = r#"
kexts:
  - bundle: Lilu.kext
    exec: Lilu
  - bundle: VirtualSMC.kext
    exec: VirtualSMC
booter_quirks:
  AvoidRuntimeDefrag: true
  ProvideCustomSlide: true
kernel_quirks:
  DisableLinkeditJettison: true
boot_args: "-v keepsyms=1 alcid=1"
csr_active_config: "67000000"
smbios:
  SystemProductName: iMacPro1,1
  SystemSerialNumber: F5KFV03CP7QM
  MLB: F5K828BGGQPGYSMAC
  SystemUUID: 0FC57E79-1679-4A40-BED5-9E3F73E4D1FB
  ROM: "0017F2AABBCC"
device_properties:
  PciRoot(0x0)/Pci(0x1f,0x3):
    layout-id: 7
uefi_drivers:
  - path: OpenRuntime.efi
  - path: HfsPlus.efi
tools:
  - Name: OpenShell
    Path: OpenShell.efi
    Auxiliary: true
misc_boot:
  Timeout: 10
scan_policy: 0
"#;

fn project() -> (TempDir, Layout) {
  let temp = TempDir::new().unwrap();
  let layout = Layout::new(temp.path());
  write_sample_template(&layout.template_path()).unwrap();
  fs::create_dir_all(layout.changesets_dir()).unwrap();
  fs::write(layout.changesets_dir().join("imacpro.yaml"), CHANGESET).unwrap();
  (temp, layout)
}

#[test]
fn changeset_survives_a_disk_round_trip() {
  let (_temp, layout) = project();

  apply::apply(&layout, "imacpro", ApplyOptions::default()).unwrap();
  let recovered = apply::read_config(&layout).unwrap();

  let original = Changeset::from_yaml(CHANGESET).unwrap();
  assert_eq!(original, recovered);
}

#[test]
fn recovered_changeset_applies_to_the_same_configuration() {
  let (_temp, layout) = project();

  apply::apply(&layout, "imacpro", ApplyOptions::default()).unwrap();
  let recovered = apply::read_config(&layout).unwrap();
  let mut first = apply::load_template(&layout.config_output_path()).unwrap();

  // Write the recovered changeset and apply it over the same template.
  recovered
    .save(&layout.changesets_dir().join("recovered.yaml"))
    .unwrap();
  apply::apply(&layout, "recovered", ApplyOptions::default()).unwrap();
  let mut second = apply::load_template(&layout.config_output_path()).unwrap();

  first.remove(GENERATED_KEY);
  second.remove(GENERATED_KEY);
  assert_eq!(first, second);
}

#[test]
fn yml_extension_is_accepted() {
  let (_temp, layout) = project();
  fs::rename(
    layout.changesets_dir().join("imacpro.yaml"),
    layout.changesets_dir().join("imacpro.yml"),
  )
  .unwrap();

  apply::apply(&layout, "imacpro", ApplyOptions::default()).unwrap();
  assert!(layout.config_output_path().exists());
}
