use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ocforge_lib::Layout;
use tracing_subscriber::EnvFilter;

mod cmd;
mod output;

/// ocforge - OpenCore changeset pipeline
#[derive(Parser)]
#[command(name = "ocforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Project root holding config/ and efi-template/
  #[arg(short = 'C', long = "root", global = true, default_value = ".")]
  root: PathBuf,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Merge a changeset into the template and write config.plist
  Apply {
    /// Changeset name (without .yaml)
    changeset: String,

    /// Merge and validate without writing anything
    #[arg(long)]
    dry_run: bool,
  },

  /// Read a config.plist back as a changeset
  ReadConfig {
    /// Property list to read (defaults to the generated config.plist)
    plist: Option<PathBuf>,

    /// Write the recovered changeset here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print JSON instead of YAML
    #[arg(long, conflicts_with = "output")]
    json: bool,
  },

  /// Merge a changeset and report validation findings without writing
  Validate {
    /// Changeset name (without .yaml)
    changeset: String,
  },

  /// List available changesets
  List {
    #[arg(long)]
    json: bool,
  },

  /// Show build artifacts and remote VM state
  Status {
    #[arg(long)]
    json: bool,
  },

  /// Remove the download cache and unpacked release
  Clean,

  /// Download OpenCore, kexts, and drivers into the build tree
  Fetch,

  /// Fill placeholder SMBIOS identity fields in a changeset
  GenerateSmbios {
    /// Changeset name (without .yaml)
    changeset: String,

    /// Regenerate every identity field
    #[arg(short, long)]
    force: bool,
  },

  /// Build a bootable ISO for a changeset
  Build {
    /// Changeset name (without .yaml)
    changeset: String,

    /// Clean the build tree and refetch assets first
    #[arg(short, long)]
    force: bool,

    /// Stop after assembling the EFI tree
    #[arg(long)]
    skip_iso: bool,
  },

  /// Build and upload to the Proxmox VM
  Deploy {
    /// Changeset name (without .yaml)
    changeset: String,

    /// Clean the build tree and refetch assets first
    #[arg(short, long)]
    force: bool,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::from_default_env()
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .without_time()
    .with_writer(std::io::stderr)
    .init();

  let layout = Layout::new(&cli.root);

  match cli.command {
    Commands::Apply { changeset, dry_run } => cmd::cmd_apply(&layout, &changeset, dry_run),
    Commands::ReadConfig { plist, output, json } => {
      cmd::cmd_read_config(&layout, plist.as_deref(), output.as_deref(), json)
    }
    Commands::Validate { changeset } => cmd::cmd_validate(&layout, &changeset),
    Commands::List { json } => cmd::cmd_list(&layout, json),
    Commands::Status { json } => cmd::cmd_status(&layout, json),
    Commands::Clean => cmd::cmd_clean(&layout),
    Commands::Fetch => cmd::cmd_fetch(&layout),
    Commands::GenerateSmbios { changeset, force } => {
      cmd::cmd_generate_smbios(&layout, &changeset, force)
    }
    Commands::Build {
      changeset,
      force,
      skip_iso,
    } => cmd::cmd_build(&layout, &changeset, force, skip_iso),
    Commands::Deploy { changeset, force } => cmd::cmd_deploy(&layout, &changeset, force),
  }
}
