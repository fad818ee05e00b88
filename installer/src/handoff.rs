// SPDX-License-Identifier: GPL-3.0-only

//! Entering the new root
//!
//! Virtual filesystems are bound in first; stage two never sets them up
//! itself. The second stage then runs with a cleared environment carrying
//! only the [`HandoffMessage`] variables and `PATH`.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use install_contracts::{DeviceOps, InstallError, Result};
use install_types::HandoffMessage;
use tracing::info;

/// Where the second-stage binary lives inside the new root.
pub const STAGE_TWO_PROGRAM: &str = "/usr/local/sbin/crypt-install-stage2";

pub const STAGE_TWO_BINARY: &str = "crypt-install-stage2";

pub const VIRTUAL_FILESYSTEMS: [&str; 4] = ["/dev", "/proc", "/sys", "/run"];

/// Locate the second-stage binary next to the running executable.
pub fn sibling_stage_two() -> Result<PathBuf> {
    let current = std::env::current_exe()?;
    Ok(current.with_file_name(STAGE_TWO_BINARY))
}

pub async fn bind_virtual_filesystems(ops: &dyn DeviceOps, root: &Path) -> Result<()> {
    for source in VIRTUAL_FILESYSTEMS {
        let target = root.join(source.trim_start_matches('/'));
        ops.bind_rslave(Path::new(source), &target).await?;
    }
    Ok(())
}

/// Copy the second-stage binary into the new root with mode 0755.
pub async fn stage_binary(source: &Path, root: &Path) -> Result<PathBuf> {
    if !source.is_file() {
        return Err(InstallError::precondition(format!(
            "second-stage binary not found at {}",
            source.display()
        )));
    }

    let destination = root.join(STAGE_TWO_PROGRAM.trim_start_matches('/'));
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(source, &destination).await?;
    tokio::fs::set_permissions(&destination, std::fs::Permissions::from_mode(0o755)).await?;
    Ok(destination)
}

/// Run the second stage inside `root` with exactly the handoff environment.
pub async fn enter(ops: &dyn DeviceOps, root: &Path, message: &HandoffMessage) -> Result<()> {
    info!(root = %root.display(), hostname = %message.hostname, "handing off to stage two");
    ops.run_in_root(root, STAGE_TWO_PROGRAM, &message.environment())
        .await
}
