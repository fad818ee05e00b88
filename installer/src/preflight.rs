// SPDX-License-Identifier: GPL-3.0-only

//! Checks that run before anything destructive
//!
//! Host checks look at the live machine directly. Device checks go through
//! the device operations so they can be exercised against a fake.

use std::io::{BufRead, Write};
use std::path::Path;

use install_contracts::{DeviceOps, InstallError, Result};
use install_sys::{INSTALL_TOOLS, missing_tools};
use install_types::{DiskLayout, InstallConfig, is_disk_or_partition, is_valid_hostname};
use nix::sys::stat::{SFlag, stat};
use nix::unistd::geteuid;
use tracing::{debug, info};

/// Privileges, tools on `PATH`, and the target being a block device.
pub fn host_checks(config: &InstallConfig) -> Result<()> {
    if !geteuid().is_root() {
        return Err(InstallError::precondition("must run as root"));
    }

    require_tools(INSTALL_TOOLS)?;

    let metadata = stat(Path::new(&config.disk)).map_err(|errno| {
        InstallError::precondition(format!("cannot stat {}: {errno}", config.disk))
    })?;
    let file_type = SFlag::from_bits_truncate(metadata.st_mode) & SFlag::S_IFMT;
    if file_type != SFlag::S_IFBLK {
        return Err(InstallError::precondition(format!(
            "{} is not a block device",
            config.disk
        )));
    }

    Ok(())
}

/// Fail with every tool from `tools` that is missing, not just the first.
pub fn require_tools(tools: &[&str]) -> Result<()> {
    let missing = missing_tools(tools);
    if !missing.is_empty() {
        return Err(InstallError::precondition(format!(
            "required tools not found: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

/// Hostname, mount state of the disk, capacity and the target root.
///
/// Returns the partition plan so the caller can show and then write it.
pub async fn device_checks(ops: &dyn DeviceOps, config: &InstallConfig) -> Result<DiskLayout> {
    if !is_valid_hostname(&config.hostname) {
        return Err(InstallError::precondition(format!(
            "'{}' is not a valid hostname",
            config.hostname
        )));
    }

    let mounts = ops.mounts().await?;
    if let Some(record) = mounts
        .iter()
        .find(|record| is_disk_or_partition(&config.disk, &record.source))
    {
        return Err(InstallError::precondition(format!(
            "{} is mounted at {}",
            record.source,
            record.mount_point.display()
        )));
    }

    let layout = config.layout()?;
    match ops.device_size_mib(&config.disk).await {
        Some(device_mib) => {
            layout.check_capacity(device_mib)?;
            debug!(device_mib, required_mib = layout.required_mib(), "capacity ok");
        }
        None => info!(disk = %config.disk, "device size unknown; leaving capacity to parted"),
    }

    tokio::fs::create_dir_all(&config.target_root)
        .await
        .map_err(|error| {
            InstallError::precondition(format!(
                "cannot create {}: {error}",
                config.target_root.display()
            ))
        })?;

    Ok(layout)
}

/// Show the plan and require the operator to type the device path back.
pub fn confirm_destruction<R, W>(
    config: &InstallConfig,
    layout: &DiskLayout,
    mut input: R,
    mut output: W,
) -> Result<()>
where
    R: BufRead,
    W: Write,
{
    if config.force {
        return Ok(());
    }

    writeln!(output, "All data on {} will be destroyed.", config.disk)?;
    for partition in &layout.partitions {
        let end = partition
            .end_mib
            .map(|end| format!("{end}MiB"))
            .unwrap_or_else(|| "end of disk".to_string());
        writeln!(
            output,
            "  {} {:<4} {}MiB - {}{}",
            config.partition_device(partition.role),
            partition.role.gpt_name(),
            partition.start_mib,
            end,
            if partition.encrypted { " (LUKS2)" } else { "" }
        )?;
    }
    write!(output, "Type {} to continue: ", config.disk)?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    if answer.trim() != config.disk {
        return Err(InstallError::precondition("confirmation declined"));
    }
    Ok(())
}
