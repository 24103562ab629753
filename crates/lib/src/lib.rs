//! ocforge-lib: Core types and logic for ocforge
//!
//! This crate provides the pieces of the changeset pipeline:
//! - `Changeset`: the declarative YAML diff against the base template
//! - `merge`: the strategy-driven engine that folds a changeset into a plist
//! - `validate`: post-merge structural checks
//! - `reflect`: the inverse transform, configuration back to changeset
//! - `assets`, `build`, `deploy`: fetching binaries, ISO assembly, Proxmox upload

pub mod apply;
pub mod assets;
pub mod build;
pub mod changeset;
pub mod data;
pub mod deploy;
pub mod error;
pub mod merge;
pub mod paths;
pub mod reflect;
pub mod smbios;
pub mod testutil;
pub mod validate;

pub use changeset::Changeset;
pub use error::{Error, Result};
pub use paths::Layout;
