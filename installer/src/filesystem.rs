// SPDX-License-Identifier: GPL-3.0-only

//! Filesystems and the btrfs subvolume tree
//!
//! A fresh btrfs volume has no subvolumes to select, so the tree is built in
//! two phases: top-level subvolumes on the raw volume mounted at a scratch
//! point, then a remount of `@` at the real target with the remaining
//! subvolumes mounted or created beneath it.

use std::path::Path;

use install_contracts::{DeviceOps, Result};
use install_types::{FilesystemKind, InstallConfig, PartitionRole, SubvolumeTree};
use tracing::{debug, info};

pub struct FilesystemProvisioner<'a> {
    ops: &'a dyn DeviceOps,
    config: &'a InstallConfig,
    tree: &'a SubvolumeTree,
}

impl<'a> FilesystemProvisioner<'a> {
    pub fn new(ops: &'a dyn DeviceOps, config: &'a InstallConfig, tree: &'a SubvolumeTree) -> Self {
        Self { ops, config, tree }
    }

    /// FAT32 on the ESP, ext2 on boot, btrfs on the mapped device.
    pub async fn format(&self, mapped: &str) -> Result<()> {
        let labels = &self.config.labels;
        let esp = self.config.partition_device(PartitionRole::Esp);
        let boot = self.config.partition_device(PartitionRole::Boot);

        info!("creating filesystems");
        self.ops
            .make_filesystem(&esp, FilesystemKind::Vfat, &labels.esp)
            .await?;
        self.ops
            .make_filesystem(&boot, FilesystemKind::Ext2, &labels.boot)
            .await?;
        self.ops
            .make_filesystem(mapped, FilesystemKind::Btrfs, &labels.root)
            .await
    }

    /// Phase one: create the top-level subvolumes on the raw volume.
    ///
    /// The scratch mount is released again before returning.
    pub async fn create_top_level(&self, mapped: &str) -> Result<()> {
        let scratch = &self.config.scratch_mount;

        self.ops.mount(mapped, scratch, None).await?;
        for subvolume in self.tree.top_level() {
            self.ops.create_subvolume(&scratch.join(&subvolume.name)).await?;
        }
        self.ops.unmount_recursive(scratch).await
    }

    /// Phase two, first half: `@` at the target root.
    pub async fn mount_root(&self, mapped: &str) -> Result<()> {
        let options = self.tree.root.mount_options(&self.config.mount_options);
        self.ops
            .mount(mapped, &self.config.target_root, Some(options.as_str()))
            .await
    }

    /// Phase two, second half: child mounts and nested subvolumes under the root.
    pub async fn populate_root(&self, mapped: &str) -> Result<()> {
        let root = &self.config.target_root;
        let options = &self.config.mount_options;

        for child in self.tree.mounted_children() {
            self.ops
                .mount(mapped, &child.target(root), Some(child.mount_options(options).as_str()))
                .await?;
        }

        for nested in self.tree.nested() {
            let target = nested.target(root);
            ensure_parent(&target).await?;
            self.ops.create_subvolume(&target).await?;
        }

        info!(root = %root.display(), "subvolume tree mounted");
        Ok(())
    }

    /// Mount the ESP at `<root>/efi` and boot at `<root>/boot`.
    pub async fn mount_boot(&self) -> Result<()> {
        let root = &self.config.target_root;
        let esp = self.config.partition_device(PartitionRole::Esp);
        let boot = self.config.partition_device(PartitionRole::Boot);

        self.ops.mount(&boot, &root.join("boot"), None).await?;
        self.ops.mount(&esp, &root.join("efi"), None).await
    }
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        debug!(parent = %parent.display(), "creating parent directory");
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}
