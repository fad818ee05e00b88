// SPDX-License-Identifier: GPL-3.0-only

//! fstab generation
//!
//! Entries are always emitted in the same order so regenerating from the
//! same live mount state yields byte-identical output.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::layout::FilesystemKind;
use crate::subvolume::SubvolumeTree;

/// UUIDs read back from the mounted filesystems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveUuids {
    pub root: String,
    pub esp: String,
    pub boot: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FstabEntry {
    /// `UUID=...` or a pseudo source such as `tmpfs`.
    pub source: String,
    pub mount_point: String,
    pub fs_type: String,
    pub options: String,
    pub dump: u8,
    pub pass: u8,
}

impl FstabEntry {
    fn by_uuid(uuid: &str, mount_point: &str, fs: FilesystemKind, options: String, pass: u8) -> Self {
        Self {
            source: format!("UUID={uuid}"),
            mount_point: mount_point.to_string(),
            fs_type: fs.fstab_type().to_string(),
            options,
            dump: 0,
            pass,
        }
    }
}

impl fmt::Display for FstabEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.source, self.mount_point, self.fs_type, self.options, self.dump, self.pass
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fstab {
    pub entries: Vec<FstabEntry>,
}

impl Fstab {
    /// Root, ESP, boot, home, snapshots, then a tmpfs on `/tmp`.
    pub fn standard(uuids: &LiveUuids, tree: &SubvolumeTree, base_options: &str) -> Self {
        let entries = vec![
            FstabEntry::by_uuid(
                &uuids.root,
                &tree.root.mount_point,
                FilesystemKind::Btrfs,
                tree.root.mount_options(base_options),
                0,
            ),
            FstabEntry::by_uuid(&uuids.esp, "/efi", FilesystemKind::Vfat, "defaults".into(), 2),
            FstabEntry::by_uuid(&uuids.boot, "/boot", FilesystemKind::Ext2, "defaults".into(), 2),
            FstabEntry::by_uuid(
                &uuids.root,
                &tree.home.mount_point,
                FilesystemKind::Btrfs,
                tree.home.mount_options(base_options),
                0,
            ),
            FstabEntry::by_uuid(
                &uuids.root,
                &tree.snapshots.mount_point,
                FilesystemKind::Btrfs,
                tree.snapshots.mount_options(base_options),
                0,
            ),
            FstabEntry {
                source: "tmpfs".to_string(),
                mount_point: "/tmp".to_string(),
                fs_type: "tmpfs".to_string(),
                options: "defaults,nosuid,nodev".to_string(),
                dump: 0,
                pass: 0,
            },
        ];

        Self { entries }
    }

    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|entry| format!("{entry}\n"))
            .collect()
    }
}
