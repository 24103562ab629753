//! Known quirk and boot-option names with their OpenCore defaults.
//!
//! These tables serve three purposes: typo detection during merge (a key
//! absent from the table is a hard schema error), default suppression during
//! the inverse transform (only non-default values are reflected back into a
//! changeset), and documentation of the value type each flag carries.

use plist::Value;

/// Default value of a flag, which doubles as its expected type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlagDefault {
  Bool(bool),
  Int(i64),
  Text(&'static str),
}

impl FlagDefault {
  /// True when a document value equals this default.
  pub fn matches(&self, value: &Value) -> bool {
    match (self, value) {
      (FlagDefault::Bool(d), Value::Boolean(v)) => d == v,
      (FlagDefault::Int(d), Value::Integer(v)) => v.as_signed() == Some(*d),
      (FlagDefault::Text(d), Value::String(v)) => d == v,
      _ => false,
    }
  }
}

pub const BOOTER_QUIRKS: &[(&str, FlagDefault)] = &[
  ("AllowRelocationBlock", FlagDefault::Bool(false)),
  ("AvoidRuntimeDefrag", FlagDefault::Bool(false)),
  ("ClearTaskSwitchBit", FlagDefault::Bool(false)),
  ("DevirtualiseMmio", FlagDefault::Bool(false)),
  ("DisableSingleUser", FlagDefault::Bool(false)),
  ("DisableVariableWrite", FlagDefault::Bool(false)),
  ("DiscardHibernateMap", FlagDefault::Bool(false)),
  ("EnableSafeModeSlide", FlagDefault::Bool(false)),
  ("EnableWriteUnprotector", FlagDefault::Bool(false)),
  ("FixupAppleEfiImages", FlagDefault::Bool(true)),
  ("ForceBooterSignature", FlagDefault::Bool(false)),
  ("ForceExitBootServices", FlagDefault::Bool(false)),
  ("ProtectMemoryRegions", FlagDefault::Bool(false)),
  ("ProtectSecureBoot", FlagDefault::Bool(false)),
  ("ProtectUefiServices", FlagDefault::Bool(false)),
  ("ProvideCustomSlide", FlagDefault::Bool(false)),
  ("ProvideMaxSlide", FlagDefault::Int(0)),
  ("RebuildAppleMemoryMap", FlagDefault::Bool(false)),
  ("ResizeAppleGpuBars", FlagDefault::Int(-1)),
  ("SetupVirtualMap", FlagDefault::Bool(true)),
  ("SignalAppleOS", FlagDefault::Bool(false)),
  ("SyncRuntimePermissions", FlagDefault::Bool(false)),
];

pub const KERNEL_QUIRKS: &[(&str, FlagDefault)] = &[
  ("AppleCpuPmCfgLock", FlagDefault::Bool(false)),
  ("AppleXcpmCfgLock", FlagDefault::Bool(false)),
  ("AppleXcpmExtraMsrs", FlagDefault::Bool(false)),
  ("AppleXcpmForceBoost", FlagDefault::Bool(false)),
  ("CustomPciSerialDevice", FlagDefault::Bool(false)),
  ("CustomSMBIOSGuid", FlagDefault::Bool(false)),
  ("DisableIoMapper", FlagDefault::Bool(false)),
  ("DisableIoMapperMapping", FlagDefault::Bool(false)),
  ("DisableLinkeditJettison", FlagDefault::Bool(false)),
  ("DisableRtcChecksum", FlagDefault::Bool(false)),
  ("ExtendBTFeatureFlags", FlagDefault::Bool(false)),
  ("ExternalDiskIcons", FlagDefault::Bool(false)),
  ("ForceAquantiaEthernet", FlagDefault::Bool(false)),
  ("ForceSecureBootScheme", FlagDefault::Bool(false)),
  ("IncreasePciBarSize", FlagDefault::Bool(false)),
  ("LapicKernelPanic", FlagDefault::Bool(false)),
  ("LegacyCommpage", FlagDefault::Bool(false)),
  ("PanicNoKextDump", FlagDefault::Bool(false)),
  ("PowerTimeoutKernelPanic", FlagDefault::Bool(false)),
  ("ProvideCurrentCpuInfo", FlagDefault::Bool(false)),
  ("SetApfsTrimTimeout", FlagDefault::Int(-1)),
  ("ThirdPartyDrives", FlagDefault::Bool(false)),
  ("XhciPortLimit", FlagDefault::Bool(false)),
];

pub const ACPI_QUIRKS: &[(&str, FlagDefault)] = &[
  ("FadtEnableReset", FlagDefault::Bool(false)),
  ("NormalizeHeaders", FlagDefault::Bool(false)),
  ("RebaseRegions", FlagDefault::Bool(false)),
  ("ResetHwSig", FlagDefault::Bool(false)),
  ("ResetLogoStatus", FlagDefault::Bool(false)),
  ("SyncTableIds", FlagDefault::Bool(false)),
];

pub const KERNEL_EMULATE: &[(&str, FlagDefault)] = &[
  ("DummyPowerManagement", FlagDefault::Bool(false)),
  ("MaxKernel", FlagDefault::Text("")),
  ("MinKernel", FlagDefault::Text("")),
];

pub const MISC_BOOT: &[(&str, FlagDefault)] = &[
  ("HibernateMode", FlagDefault::Text("None")),
  ("HideAuxiliary", FlagDefault::Bool(false)),
  ("LauncherOption", FlagDefault::Text("Disabled")),
  ("LauncherPath", FlagDefault::Text("Default")),
  ("PickerAttributes", FlagDefault::Int(1)),
  ("PickerMode", FlagDefault::Text("Builtin")),
  ("ShowPicker", FlagDefault::Bool(true)),
  ("TakeoffDelay", FlagDefault::Int(0)),
  ("Timeout", FlagDefault::Int(5)),
];

/// Security scalars with defaults, for default suppression on reflect.
pub const MISC_SECURITY: &[(&str, FlagDefault)] = &[
  ("ScanPolicy", FlagDefault::Int(17_760_515)),
  ("SecureBootModel", FlagDefault::Text("Default")),
  ("Vault", FlagDefault::Text("Secure")),
];

/// Template default for `csr-active-config` (SIP fully enabled). The
/// inverse transform suppresses a value equal to this, like any other
/// default.
pub const CSR_DEFAULT: [u8; 4] = [0, 0, 0, 0];

pub fn lookup(table: &[(&str, FlagDefault)], name: &str) -> Option<FlagDefault> {
  table.iter().find(|(n, _)| *n == name).map(|(_, d)| *d)
}
