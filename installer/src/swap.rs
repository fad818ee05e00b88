// SPDX-License-Identifier: GPL-3.0-only

//! Swap file on btrfs and its hibernation resume offset

use std::path::{Path, PathBuf};

use install_contracts::{DeviceOps, Result};
use install_types::{SubvolumeTree, parse_filefrag_first_extent, parse_map_swapfile};
use tracing::{debug, info, warn};

pub struct SwapProvisioner<'a> {
    ops: &'a dyn DeviceOps,
    root: &'a Path,
    tree: &'a SubvolumeTree,
}

impl<'a> SwapProvisioner<'a> {
    pub fn new(ops: &'a dyn DeviceOps, root: &'a Path, tree: &'a SubvolumeTree) -> Self {
        Self { ops, root, tree }
    }

    pub fn swap_file(&self) -> PathBuf {
        self.tree.swap_file(self.root)
    }

    /// Create and activate a swap file sized to physical memory.
    ///
    /// Returns the resume offset when one can be derived. Failing to derive
    /// it only disables hibernation; failing any allocation step is fatal.
    pub async fn provision(&self) -> Result<Option<u64>> {
        let swap_dir = self.tree.swap_area.target(self.root);
        if !self.ops.node_exists(&swap_dir) {
            self.ops.create_subvolume(&swap_dir).await?;
        }

        let file = self.swap_file();
        let size_mib = self.ops.memory_total_mib().await?;
        info!(file = %file.display(), size_mib, "creating swap file");

        // Attributes only stick on an empty file, so truncate first.
        self.ops.truncate_file(&file).await?;
        self.ops.disable_cow(&file).await?;
        self.ops.disable_compression(&file).await?;
        self.ops.allocate(&file, size_mib).await?;
        self.ops.restrict_permissions(&file).await?;
        self.ops.make_swap(&file).await?;
        self.ops.swap_on(&file).await?;

        Ok(self.resume_offset(&file).await)
    }

    /// Physical offset of the first extent, native query first.
    pub async fn resume_offset(&self, file: &Path) -> Option<u64> {
        match self.ops.map_swapfile(file).await {
            Ok(output) => match parse_map_swapfile(&output) {
                Some(offset) => return Some(offset),
                None => debug!(output = %output.trim(), "unrecognized map-swapfile output"),
            },
            Err(error) => debug!(%error, "map-swapfile unavailable"),
        }

        match self.ops.extent_map(file).await {
            Ok(output) => {
                if let Some(offset) = parse_filefrag_first_extent(&output) {
                    return Some(offset);
                }
                warn!("no first extent in extent map; hibernation disabled");
            }
            Err(error) => warn!(%error, "cannot derive resume offset; hibernation disabled"),
        }
        None
    }
}
