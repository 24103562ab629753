//! Implementation of the `ocforge list` command.

use anyhow::Result;
use ocforge_lib::{Changeset, Layout};

use crate::output::{print_info, print_json, print_stat, print_warning};

pub fn cmd_list(layout: &Layout, json: bool) -> Result<()> {
  let names = layout.list_changesets()?;
  if names.is_empty() {
    print_warning(&format!(
      "No changesets found in {}",
      layout.changesets_dir().display()
    ));
    return Ok(());
  }

  if json {
    let mut entries = Vec::new();
    for name in &names {
      let changeset = Changeset::load(&layout.changeset_path(name))?;
      entries.push(serde_json::json!({
        "name": name,
        "summary": changeset.summary(),
      }));
    }
    print_json(&entries)?;
    return Ok(());
  }

  for name in &names {
    let changeset = Changeset::load(&layout.changeset_path(name))?;
    let summary = changeset.summary();
    print_info(name);
    print_stat("Kexts", &summary.kext_count.to_string());
    if let Some(model) = &summary.model {
      print_stat("Model", model);
    }
    if let Some(args) = &summary.boot_args {
      print_stat("Boot args", args);
    }
    print_stat("Sections", &summary.sections.join(", "));
  }
  Ok(())
}
