// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use clap::Parser;

/// Install onto a LUKS2-encrypted btrfs root
#[derive(Debug, Parser)]
#[command(name = "crypt-install")]
#[command(about = "Partition, encrypt and install onto a raw disk", long_about = None)]
pub struct Cli {
    /// Target block device; everything on it is destroyed
    #[arg(long)]
    pub disk: Option<String>,

    /// EFI system partition size, e.g. 512MiB
    #[arg(long)]
    pub efi_size: Option<String>,

    /// Boot partition size, e.g. 1GiB
    #[arg(long)]
    pub boot_size: Option<String>,

    #[arg(long)]
    pub hostname: Option<String>,

    #[arg(long)]
    pub arch: Option<String>,

    /// Package repository base URL
    #[arg(long)]
    pub repo: Option<String>,

    /// Install the musl flavour (yes/no)
    #[arg(long, value_parser = parse_yes_no, num_args = 0..=1, default_missing_value = "yes")]
    pub musl: Option<bool>,

    /// Skip the destructive-action confirmation
    #[arg(long)]
    pub force: bool,

    /// TOML file with defaults for any of these options
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Where the new root is assembled
    #[arg(long)]
    pub target_root: Option<PathBuf>,

    /// Name of the mapped encrypted volume
    #[arg(long)]
    pub volume_name: Option<String>,

    /// LUKS2 key size in bits
    #[arg(long)]
    pub key_size: Option<u32>,

    /// Shared btrfs mount options
    #[arg(long)]
    pub mount_options: Option<String>,

    /// Extra package to install (repeatable)
    #[arg(long = "package", value_name = "PACKAGE")]
    pub packages: Vec<String>,

    /// Leave the host running after a successful install
    #[arg(long)]
    pub no_reboot: bool,

    /// Print the resolved plan as JSON and exit without touching the disk
    #[arg(long)]
    pub print_plan: bool,

    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_yes_no(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" => Ok(true),
        "no" | "n" | "false" => Ok(false),
        other => Err(format!("expected yes or no, got '{other}'")),
    }
}
