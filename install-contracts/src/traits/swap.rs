// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use async_trait::async_trait;

use crate::Result;

#[async_trait]
pub trait SwapOps: Send + Sync {
    /// Create `path` or cut it to zero length.
    async fn truncate_file(&self, path: &Path) -> Result<()>;

    /// Set the no-copy-on-write attribute. Only effective on empty files.
    async fn disable_cow(&self, path: &Path) -> Result<()>;

    async fn disable_compression(&self, path: &Path) -> Result<()>;

    /// Preallocate `size_mib` of contiguous, non-sparse storage.
    async fn allocate(&self, path: &Path, size_mib: u64) -> Result<()>;

    /// Owner read/write only.
    async fn restrict_permissions(&self, path: &Path) -> Result<()>;

    async fn make_swap(&self, path: &Path) -> Result<()>;

    async fn swap_on(&self, path: &Path) -> Result<()>;

    async fn swap_off(&self, path: &Path) -> Result<()>;

    /// Raw output of the filesystem-native swap file offset query.
    async fn map_swapfile(&self, path: &Path) -> Result<String>;

    /// Raw output of the generic extent listing.
    async fn extent_map(&self, path: &Path) -> Result<String>;

    /// Physical memory in MiB, rounded up.
    async fn memory_total_mib(&self) -> Result<u64>;
}
