// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

use crate::Result;

#[async_trait]
pub trait PartitionOps: Send + Sync {
    /// Size of the whole device in MiB, when it can be read.
    async fn device_size_mib(&self, disk: &str) -> Option<u64>;

    /// Replace the partition table using a `parted` script.
    async fn write_partition_table(&self, disk: &str, script: &[String]) -> Result<()>;

    /// Wait for the device manager to process queued events.
    async fn settle(&self) -> Result<()>;
}
