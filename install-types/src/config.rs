// SPDX-License-Identifier: GPL-3.0-only

//! Immutable installation configuration
//!
//! Built once from defaults, an optional TOML file and the command line,
//! then passed by reference to every stage.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::{mapper_path, partition_path};
use crate::handoff::HandoffMessage;
use crate::layout::{DiskLayout, LayoutError, PartitionRole};
use crate::size::SizeSpec;

pub const DEFAULT_EFI_SIZE: SizeSpec = SizeSpec::mib(512);
pub const DEFAULT_BOOT_SIZE: SizeSpec = SizeSpec::gib(1);
pub const DEFAULT_HOSTNAME: &str = "void";
pub const DEFAULT_ARCH: &str = "x86_64";
pub const DEFAULT_REPO: &str = "https://repo-default.voidlinux.org";
pub const DEFAULT_TARGET_ROOT: &str = "/mnt";
pub const DEFAULT_VOLUME_NAME: &str = "cryptroot";
pub const DEFAULT_KEY_SIZE: u32 = 512;
pub const DEFAULT_MOUNT_OPTIONS: &str = "rw,noatime,compress=zstd,space_cache=v2";
pub const DEFAULT_PACKAGES: &[&str] = &["base-system", "btrfs-progs", "cryptsetup"];

/// Interval and budget for waiting on asynchronously created device nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    pub interval_ms: u64,
    pub attempts: u32,
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            attempts: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemLabels {
    pub esp: String,
    pub boot: String,
    pub root: String,
}

impl Default for FilesystemLabels {
    fn default() -> Self {
        Self {
            esp: "EFI".to_string(),
            boot: "BOOT".to_string(),
            root: "ROOT".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Target block device, e.g. `/dev/nvme0n1`.
    pub disk: String,
    pub efi_size: SizeSpec,
    pub boot_size: SizeSpec,
    pub hostname: String,
    pub arch: String,
    pub repo: String,
    pub musl: bool,
    /// Skip the destructive-action confirmation.
    pub force: bool,
    /// Where the new root is assembled.
    pub target_root: PathBuf,
    /// Where the raw btrfs volume is mounted while top-level subvolumes are created.
    pub scratch_mount: PathBuf,
    pub volume_name: String,
    pub key_size: u32,
    pub mount_options: String,
    /// Packages installed on top of the defaults.
    pub packages: Vec<String>,
    pub reboot: bool,
    pub labels: FilesystemLabels,
    pub poll: PollSettings,
}

impl InstallConfig {
    /// Repository URL handed to the package manager.
    pub fn effective_repo(&self) -> String {
        let base = self.repo.trim_end_matches('/');
        if self.musl {
            format!("{base}/current/musl")
        } else {
            format!("{base}/current")
        }
    }

    /// Package architecture, with the `-musl` suffix when requested.
    pub fn effective_arch(&self) -> String {
        if self.musl {
            format!("{}-musl", self.arch)
        } else {
            self.arch.clone()
        }
    }

    /// Base packages, the EFI bootloader for the architecture, then configured extras.
    pub fn package_set(&self) -> Vec<String> {
        DEFAULT_PACKAGES
            .iter()
            .map(|name| name.to_string())
            .chain(std::iter::once(format!("grub-{}-efi", self.arch)))
            .chain(self.packages.iter().cloned())
            .collect()
    }

    pub fn layout(&self) -> Result<DiskLayout, LayoutError> {
        DiskLayout::plan(self.efi_size, self.boot_size)
    }

    pub fn partition_device(&self, role: PartitionRole) -> String {
        let index = match role {
            PartitionRole::Esp => 1,
            PartitionRole::Boot => 2,
            PartitionRole::Root => 3,
        };
        partition_path(&self.disk, index)
    }

    pub fn mapped_device(&self) -> String {
        mapper_path(&self.volume_name)
    }

    pub fn handoff_message(&self) -> HandoffMessage {
        HandoffMessage {
            hostname: self.hostname.clone(),
            mount_options: self.mount_options.clone(),
            esp_device: self.partition_device(PartitionRole::Esp),
            boot_device: self.partition_device(PartitionRole::Boot),
            volume_name: self.volume_name.clone(),
        }
    }
}

/// RFC 1123 host label: 1-63 alphanumerics or hyphens, not starting or ending with a hyphen.
pub fn is_valid_hostname(hostname: &str) -> bool {
    !hostname.is_empty()
        && hostname.len() <= 63
        && !hostname.starts_with('-')
        && !hostname.ends_with('-')
        && hostname
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || character == '-')
}
