// SPDX-License-Identifier: GPL-3.0-only

use which::which;

/// Binaries the first stage invokes on the live host.
pub const INSTALL_TOOLS: &[&str] = &[
    "blockdev",
    "btrfs",
    "chattr",
    "chroot",
    "cryptsetup",
    "fallocate",
    "filefrag",
    "findmnt",
    "mkfs.btrfs",
    "mkfs.ext2",
    "mkfs.vfat",
    "mkswap",
    "mount",
    "parted",
    "swapoff",
    "swapon",
    "udevadm",
    "umount",
    "wipefs",
    "xbps-install",
];

/// Binaries the second stage expects inside the new root.
pub const STAGE_TWO_TOOLS: &[&str] = &[
    "btrfs",
    "chattr",
    "cryptsetup",
    "fallocate",
    "filefrag",
    "findmnt",
    "grub-install",
    "grub-mkconfig",
    "mkswap",
    "swapon",
    "xbps-reconfigure",
];

/// Names from `tools` that cannot be resolved on `PATH`.
pub fn missing_tools(tools: &[&str]) -> Vec<String> {
    tools
        .iter()
        .filter(|tool| which(tool).is_err())
        .map(|tool| tool.to_string())
        .collect()
}
