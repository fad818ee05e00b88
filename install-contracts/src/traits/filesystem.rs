// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use async_trait::async_trait;

use install_types::{FilesystemKind, MountRecord};

use crate::Result;

#[async_trait]
pub trait FilesystemOps: Send + Sync {
    /// Erase every filesystem, RAID and partition-table signature on `device`.
    async fn wipe_signatures(&self, device: &str) -> Result<()>;

    async fn make_filesystem(&self, device: &str, kind: FilesystemKind, label: &str)
    -> Result<()>;

    async fn mount(&self, source: &str, target: &Path, options: Option<&str>) -> Result<()>;

    async fn unmount_recursive(&self, target: &Path) -> Result<()>;

    /// Recursive bind mount of `source` onto `target`, marked as a slave.
    async fn bind_rslave(&self, source: &Path, target: &Path) -> Result<()>;

    async fn create_subvolume(&self, path: &Path) -> Result<()>;

    /// UUID of the filesystem currently mounted at `mount_point`.
    async fn filesystem_uuid(&self, mount_point: &Path) -> Result<String>;

    /// Live mount table as seen by this process.
    async fn mounts(&self) -> Result<Vec<MountRecord>>;
}
