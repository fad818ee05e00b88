// SPDX-License-Identifier: GPL-3.0-only

//! Btrfs subvolume tree
//!
//! Top-level subvolumes are created on the raw volume and mounted at their
//! own mount points. Nested subvolumes are created inside the mounted root
//! tree and inherit its mount.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A subvolume created at the top level of the filesystem and mounted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountedSubvolume {
    /// Subvolume name as passed to `subvol=`.
    pub name: String,
    /// Absolute mount point inside the installed system.
    pub mount_point: String,
}

impl MountedSubvolume {
    fn new(name: &str, mount_point: &str) -> Self {
        Self {
            name: name.to_string(),
            mount_point: mount_point.to_string(),
        }
    }

    /// Mount options for this subvolume: the shared base plus a selector.
    pub fn mount_options(&self, base: &str) -> String {
        if base.is_empty() {
            format!("subvol={}", self.name)
        } else {
            format!("{base},subvol={}", self.name)
        }
    }

    /// Where this subvolume is mounted below `root`.
    pub fn target(&self, root: &Path) -> PathBuf {
        root.join(self.mount_point.trim_start_matches('/'))
    }
}

/// A subvolume created inside the mounted root tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedSubvolume {
    /// Path relative to the root of the installed system.
    pub path: String,
}

impl NestedSubvolume {
    fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }

    pub fn target(&self, root: &Path) -> PathBuf {
        root.join(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubvolumeTree {
    pub root: MountedSubvolume,
    pub home: MountedSubvolume,
    pub snapshots: MountedSubvolume,
    pub package_cache: NestedSubvolume,
    pub tmp: NestedSubvolume,
    pub service_data: NestedSubvolume,
    pub swap_area: NestedSubvolume,
}

impl Default for SubvolumeTree {
    fn default() -> Self {
        Self {
            root: MountedSubvolume::new("@", "/"),
            home: MountedSubvolume::new("@home", "/home"),
            snapshots: MountedSubvolume::new("@snapshots", "/.snapshots"),
            package_cache: NestedSubvolume::new("var/cache/xbps"),
            tmp: NestedSubvolume::new("var/tmp"),
            service_data: NestedSubvolume::new("srv"),
            swap_area: NestedSubvolume::new("swap"),
        }
    }
}

impl SubvolumeTree {
    /// Subvolumes created on the raw volume, root first.
    pub fn top_level(&self) -> [&MountedSubvolume; 3] {
        [&self.root, &self.home, &self.snapshots]
    }

    /// Children remounted under the root subvolume.
    pub fn mounted_children(&self) -> [&MountedSubvolume; 2] {
        [&self.home, &self.snapshots]
    }

    /// Service subvolumes that inherit the root mount. The swap area is
    /// listed last so it exists before the swap file is provisioned.
    pub fn nested(&self) -> [&NestedSubvolume; 4] {
        [
            &self.package_cache,
            &self.tmp,
            &self.service_data,
            &self.swap_area,
        ]
    }

    /// Location of the swap file below `root`.
    pub fn swap_file(&self, root: &Path) -> PathBuf {
        self.swap_area.target(root).join("swapfile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_options_append_subvolume_selector() {
        let tree = SubvolumeTree::default();
        assert_eq!(
            tree.home.mount_options("rw,noatime,compress=zstd"),
            "rw,noatime,compress=zstd,subvol=@home"
        );
        assert_eq!(tree.root.mount_options(""), "subvol=@");
    }

    #[test]
    fn targets_resolve_below_root() {
        let tree = SubvolumeTree::default();
        let root = Path::new("/mnt");
        assert_eq!(tree.root.target(root), PathBuf::from("/mnt"));
        assert_eq!(tree.snapshots.target(root), PathBuf::from("/mnt/.snapshots"));
        assert_eq!(tree.swap_file(root), PathBuf::from("/mnt/swap/swapfile"));
    }
}
