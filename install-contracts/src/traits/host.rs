// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use async_trait::async_trait;

use crate::Result;

#[async_trait]
pub trait HostOps: Send + Sync {
    /// Whether a device node or file is currently visible.
    fn node_exists(&self, path: &Path) -> bool;

    /// Materialize the base system into `root` with the package manager.
    async fn install_base_system(
        &self,
        root: &Path,
        repo: &str,
        arch: &str,
        packages: &[String],
    ) -> Result<()>;

    /// Run `program` inside `root` with exactly `environment`.
    async fn run_in_root(
        &self,
        root: &Path,
        program: &str,
        environment: &[(String, String)],
    ) -> Result<()>;

    /// Re-run package configuration hooks.
    async fn reconfigure(&self, args: &[&str]) -> Result<()>;

    async fn install_bootloader(&self, efi_directory: &Path, bootloader_id: &str) -> Result<()>;

    /// Generate the bootloader menu at `output`.
    async fn write_boot_menu(&self, output: &Path) -> Result<()>;

    async fn reboot(&self) -> Result<()>;
}
