// SPDX-License-Identifier: GPL-3.0-only

//! Three-partition GPT plan
//!
//! ESP and boot are sized by the caller; root takes whatever is left. The
//! first partition starts at a 1 MiB alignment gap and every later partition
//! starts exactly where the previous one ends.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::size::SizeSpec;

/// Alignment gap before the first partition.
pub const ALIGNMENT_MIB: u64 = 1;

/// Smallest root partition the capacity check accepts.
pub const MIN_ROOT_MIB: u64 = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("{role} partition would be empty ({requested} rounds down to 0 MiB)")]
    EmptyPartition {
        role: PartitionRole,
        requested: SizeSpec,
    },
    #[error("device has {available_mib} MiB but the layout needs at least {required_mib} MiB")]
    InsufficientCapacity { available_mib: u64, required_mib: u64 },
    #[error("{efi} EFI and {boot} boot partitions do not fit in any addressable device")]
    Oversized { efi: SizeSpec, boot: SizeSpec },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionRole {
    Esp,
    Boot,
    Root,
}

impl PartitionRole {
    /// GPT partition name written into the table.
    pub fn gpt_name(self) -> &'static str {
        match self {
            PartitionRole::Esp => "ESP",
            PartitionRole::Boot => "BOOT",
            PartitionRole::Root => "ROOT",
        }
    }
}

impl std::fmt::Display for PartitionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PartitionRole::Esp => "EFI system",
            PartitionRole::Boot => "boot",
            PartitionRole::Root => "root",
        })
    }
}

/// Filesystem a partition receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilesystemKind {
    Vfat,
    Ext2,
    Btrfs,
}

impl FilesystemKind {
    /// Filesystem hint understood by `parted mkpart`.
    pub fn parted_hint(self) -> &'static str {
        match self {
            FilesystemKind::Vfat => "fat32",
            FilesystemKind::Ext2 => "ext2",
            FilesystemKind::Btrfs => "btrfs",
        }
    }

    /// Type field used in fstab.
    pub fn fstab_type(self) -> &'static str {
        match self {
            FilesystemKind::Vfat => "vfat",
            FilesystemKind::Ext2 => "ext2",
            FilesystemKind::Btrfs => "btrfs",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionDescriptor {
    /// 1-based partition index.
    pub number: u32,
    pub role: PartitionRole,
    pub start_mib: u64,
    /// `None` means the partition runs to the end of the device.
    pub end_mib: Option<u64>,
    pub filesystem: FilesystemKind,
    /// Root is wrapped in LUKS2 before its filesystem is created.
    pub encrypted: bool,
}

impl PartitionDescriptor {
    /// End offset, resolving "rest of disk" against the device size.
    pub fn resolved_end(&self, device_mib: u64) -> u64 {
        self.end_mib.unwrap_or(device_mib)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskLayout {
    pub partitions: Vec<PartitionDescriptor>,
}

impl DiskLayout {
    /// Plan ESP, boot and root for the requested sizes.
    pub fn plan(efi: SizeSpec, boot: SizeSpec) -> Result<Self, LayoutError> {
        let efi_mib = efi.to_mib();
        if efi_mib == 0 {
            return Err(LayoutError::EmptyPartition {
                role: PartitionRole::Esp,
                requested: efi,
            });
        }
        let boot_mib = boot.to_mib();
        if boot_mib == 0 {
            return Err(LayoutError::EmptyPartition {
                role: PartitionRole::Boot,
                requested: boot,
            });
        }

        let oversized = || LayoutError::Oversized { efi, boot };
        let esp_end = ALIGNMENT_MIB.checked_add(efi_mib).ok_or_else(oversized)?;
        let boot_end = esp_end.checked_add(boot_mib).ok_or_else(oversized)?;
        // Root needs room too, so the capacity bound must stay representable.
        boot_end.checked_add(MIN_ROOT_MIB).ok_or_else(oversized)?;

        Ok(Self {
            partitions: vec![
                PartitionDescriptor {
                    number: 1,
                    role: PartitionRole::Esp,
                    start_mib: ALIGNMENT_MIB,
                    end_mib: Some(esp_end),
                    filesystem: FilesystemKind::Vfat,
                    encrypted: false,
                },
                PartitionDescriptor {
                    number: 2,
                    role: PartitionRole::Boot,
                    start_mib: esp_end,
                    end_mib: Some(boot_end),
                    filesystem: FilesystemKind::Ext2,
                    encrypted: false,
                },
                PartitionDescriptor {
                    number: 3,
                    role: PartitionRole::Root,
                    start_mib: boot_end,
                    end_mib: None,
                    filesystem: FilesystemKind::Btrfs,
                    encrypted: true,
                },
            ],
        })
    }

    pub fn partition(&self, role: PartitionRole) -> Option<&PartitionDescriptor> {
        self.partitions.iter().find(|partition| partition.role == role)
    }

    /// Smallest device that leaves root at least [`MIN_ROOT_MIB`].
    pub fn required_mib(&self) -> u64 {
        let root_start = self
            .partitions
            .iter()
            .filter_map(|partition| partition.end_mib)
            .max()
            .unwrap_or(ALIGNMENT_MIB);
        root_start.saturating_add(MIN_ROOT_MIB)
    }

    pub fn check_capacity(&self, device_mib: u64) -> Result<(), LayoutError> {
        let required_mib = self.required_mib();
        if device_mib < required_mib {
            return Err(LayoutError::InsufficientCapacity {
                available_mib: device_mib,
                required_mib,
            });
        }
        Ok(())
    }

    /// Script for `parted --script <disk> ...` creating the whole table.
    pub fn parted_script(&self) -> Vec<String> {
        let mut script = vec!["mklabel".to_string(), "gpt".to_string()];

        for partition in &self.partitions {
            let end = match partition.end_mib {
                Some(end) => format!("{end}MiB"),
                None => "100%".to_string(),
            };
            script.extend([
                "mkpart".to_string(),
                partition.role.gpt_name().to_string(),
                partition.filesystem.parted_hint().to_string(),
                format!("{}MiB", partition.start_mib),
                end,
            ]);
            if partition.role == PartitionRole::Esp {
                script.extend([
                    "set".to_string(),
                    partition.number.to_string(),
                    "esp".to_string(),
                    "on".to_string(),
                ]);
            }
        }

        script
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(efi: &str, boot: &str) -> DiskLayout {
        DiskLayout::plan(efi.parse().unwrap(), boot.parse().unwrap()).unwrap()
    }

    #[test]
    fn plans_reference_layout_on_20gib_device() {
        let layout = layout("200MiB", "500MiB");
        let ranges: Vec<(u64, u64)> = layout
            .partitions
            .iter()
            .map(|partition| (partition.start_mib, partition.resolved_end(20480)))
            .collect();

        assert_eq!(ranges, vec![(1, 201), (201, 701), (701, 20480)]);
        assert!(layout.check_capacity(20480).is_ok());
    }

    #[test]
    fn offsets_are_strictly_increasing_and_root_is_open_ended() {
        for (efi, boot) in [("1MiB", "1MiB"), ("512MiB", "1GiB"), ("300MB", "2GB")] {
            let layout = layout(efi, boot);
            let [esp, boot, root] = layout.partitions.as_slice() else {
                panic!("expected three partitions");
            };

            assert!(esp.start_mib < esp.end_mib.unwrap());
            assert_eq!(boot.start_mib, esp.end_mib.unwrap());
            assert!(boot.start_mib < boot.end_mib.unwrap());
            assert_eq!(root.start_mib, boot.end_mib.unwrap());
            assert_eq!(root.end_mib, None);
        }
    }

    #[test]
    fn parted_script_marks_esp_and_fills_disk() {
        let script = layout("200MiB", "500MiB").parted_script().join(" ");
        assert_eq!(
            script,
            "mklabel gpt \
             mkpart ESP fat32 1MiB 201MiB set 1 esp on \
             mkpart BOOT ext2 201MiB 701MiB \
             mkpart ROOT btrfs 701MiB 100%"
        );
    }

    #[test]
    fn undersized_device_is_rejected() {
        let layout = layout("512MiB", "1GiB");
        let error = layout.check_capacity(1024).unwrap_err();
        assert_eq!(
            error,
            LayoutError::InsufficientCapacity {
                available_mib: 1024,
                required_mib: 1 + 512 + 1024 + MIN_ROOT_MIB,
            }
        );
    }

    #[test]
    fn sizes_that_round_to_zero_are_rejected() {
        let error = DiskLayout::plan("1MB".parse().unwrap(), SizeSpec::mib(500)).unwrap_err();
        assert!(matches!(
            error,
            LayoutError::EmptyPartition {
                role: PartitionRole::Esp,
                ..
            }
        ));
    }

    #[test]
    fn sizes_past_the_addressable_range_are_rejected() {
        let huge: SizeSpec = "18446744073709551615MiB".parse().unwrap();
        let error = DiskLayout::plan(huge, SizeSpec::mib(500)).unwrap_err();
        assert_eq!(
            error,
            LayoutError::Oversized {
                efi: huge,
                boot: SizeSpec::mib(500),
            }
        );

        let big = SizeSpec::gib(18014398509481983);
        assert!(matches!(
            DiskLayout::plan(big, big),
            Err(LayoutError::Oversized { .. })
        ));

        // Fits on its own but leaves no room for the minimum root.
        let edge = SizeSpec::mib(u64::MAX - ALIGNMENT_MIB - 1);
        assert!(matches!(
            DiskLayout::plan(edge, SizeSpec::mib(1)),
            Err(LayoutError::Oversized { .. })
        ));
    }
}
