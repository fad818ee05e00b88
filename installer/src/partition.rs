// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use install_contracts::{DeviceOps, Result};
use install_sys::poll_until;
use install_types::{DiskLayout, InstallConfig, partition_path};
use tracing::info;

/// Write the GPT layout and wait until every partition node is visible.
pub async fn write_layout(
    ops: &dyn DeviceOps,
    config: &InstallConfig,
    layout: &DiskLayout,
) -> Result<()> {
    info!(disk = %config.disk, "writing partition table");
    ops.write_partition_table(&config.disk, &layout.parted_script())
        .await?;
    ops.settle().await?;

    for partition in &layout.partitions {
        let node = partition_path(&config.disk, partition.number);
        poll_until(&node, config.poll, || ops.node_exists(Path::new(&node))).await?;
    }
    Ok(())
}
