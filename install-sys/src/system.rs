// SPDX-License-Identifier: GPL-3.0-only

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use async_trait::async_trait;
use install_contracts::{
    FilesystemOps, HostOps, InstallError, LuksOps, PartitionOps, Result, SwapOps,
};
use install_types::{FilesystemKind, MountRecord};
use tracing::{debug, info};

use crate::cmd::{render, run, run_attached};
use crate::mounts::read_mounts;
use crate::probe::{parse_cryptsetup_status_device, parse_device_size_mib, parse_meminfo_total_mib};

const XBPS_KEYS: &str = "var/db/xbps/keys";

/// Device operations backed by the host's storage tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDeviceOps;

impl SystemDeviceOps {
    pub fn new() -> Self {
        Self
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[async_trait]
impl PartitionOps for SystemDeviceOps {
    async fn device_size_mib(&self, disk: &str) -> Option<u64> {
        match run("blockdev", &["--getsize64", disk]).await {
            Ok(stdout) => parse_device_size_mib(&stdout),
            Err(error) => {
                debug!(disk, %error, "device size unavailable");
                None
            }
        }
    }

    async fn write_partition_table(&self, disk: &str, script: &[String]) -> Result<()> {
        let mut args = vec![
            "-s".to_string(),
            "-a".to_string(),
            "optimal".to_string(),
            disk.to_string(),
        ];
        args.extend(script.iter().cloned());
        run("parted", &args).await?;
        Ok(())
    }

    async fn settle(&self) -> Result<()> {
        run("udevadm", &["settle"]).await?;
        Ok(())
    }
}

#[async_trait]
impl LuksOps for SystemDeviceOps {
    async fn luks_format(&self, partition: &str, key_size: u32) -> Result<()> {
        let key_size = key_size.to_string();
        run_attached(
            "cryptsetup",
            &[
                "-q",
                "luksFormat",
                "--type",
                "luks2",
                "--key-size",
                key_size.as_str(),
                "--verify-passphrase",
                partition,
            ],
            &[],
        )
        .await
    }

    async fn luks_open(&self, partition: &str, name: &str) -> Result<()> {
        run_attached("cryptsetup", &["open", partition, name], &[]).await
    }

    async fn luks_close(&self, name: &str) -> Result<()> {
        run("cryptsetup", &["close", name]).await?;
        Ok(())
    }

    async fn luks_uuid(&self, name: &str) -> Result<String> {
        let status = run("cryptsetup", &["status", name]).await?;
        let device = parse_cryptsetup_status_device(&status).ok_or_else(|| {
            InstallError::precondition(format!("no backing device reported for mapping {name}"))
        })?;
        let uuid = run("cryptsetup", &["luksUUID", device.as_str()]).await?;
        Ok(uuid.trim().to_string())
    }
}

#[async_trait]
impl FilesystemOps for SystemDeviceOps {
    async fn wipe_signatures(&self, device: &str) -> Result<()> {
        run("wipefs", &["-a", device]).await?;
        Ok(())
    }

    async fn make_filesystem(
        &self,
        device: &str,
        kind: FilesystemKind,
        label: &str,
    ) -> Result<()> {
        match kind {
            FilesystemKind::Vfat => run("mkfs.vfat", &["-F", "32", "-n", label, device]).await?,
            FilesystemKind::Ext2 => run("mkfs.ext2", &["-F", "-L", label, device]).await?,
            FilesystemKind::Btrfs => run("mkfs.btrfs", &["-f", "-L", label, device]).await?,
        };
        Ok(())
    }

    async fn mount(&self, source: &str, target: &Path, options: Option<&str>) -> Result<()> {
        tokio::fs::create_dir_all(target).await?;
        let target = path_arg(target);
        match options {
            Some(options) => run("mount", &["-o", options, source, target.as_str()]).await?,
            None => run("mount", &[source, target.as_str()]).await?,
        };
        Ok(())
    }

    async fn unmount_recursive(&self, target: &Path) -> Result<()> {
        run("umount", &["-R".to_string(), path_arg(target)]).await?;
        Ok(())
    }

    async fn bind_rslave(&self, source: &Path, target: &Path) -> Result<()> {
        tokio::fs::create_dir_all(target).await?;
        let (source, target) = (path_arg(source), path_arg(target));
        run("mount", &["--rbind", source.as_str(), target.as_str()]).await?;
        run("mount", &["--make-rslave", target.as_str()]).await?;
        Ok(())
    }

    async fn create_subvolume(&self, path: &Path) -> Result<()> {
        run("btrfs", &["subvolume".to_string(), "create".to_string(), path_arg(path)]).await?;
        Ok(())
    }

    async fn filesystem_uuid(&self, mount_point: &Path) -> Result<String> {
        let target = path_arg(mount_point);
        let stdout = run("findmnt", &["-n", "-o", "UUID", "-M", target.as_str()]).await?;
        let uuid = stdout.trim();
        if uuid.is_empty() {
            return Err(InstallError::precondition(format!(
                "no filesystem UUID reported for {target}"
            )));
        }
        Ok(uuid.to_string())
    }

    async fn mounts(&self) -> Result<Vec<MountRecord>> {
        read_mounts().await
    }
}

#[async_trait]
impl SwapOps for SystemDeviceOps {
    async fn truncate_file(&self, path: &Path) -> Result<()> {
        tokio::fs::File::create(path).await?;
        Ok(())
    }

    async fn disable_cow(&self, path: &Path) -> Result<()> {
        run("chattr", &["+C".to_string(), path_arg(path)]).await?;
        Ok(())
    }

    async fn disable_compression(&self, path: &Path) -> Result<()> {
        let path = path_arg(path);
        run(
            "btrfs",
            &["property", "set", path.as_str(), "compression", "none"],
        )
        .await?;
        Ok(())
    }

    async fn allocate(&self, path: &Path, size_mib: u64) -> Result<()> {
        run("fallocate", &["-l".to_string(), format!("{size_mib}M"), path_arg(path)]).await?;
        Ok(())
    }

    async fn restrict_permissions(&self, path: &Path) -> Result<()> {
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
        Ok(())
    }

    async fn make_swap(&self, path: &Path) -> Result<()> {
        run("mkswap", &[path_arg(path)]).await?;
        Ok(())
    }

    async fn swap_on(&self, path: &Path) -> Result<()> {
        run("swapon", &[path_arg(path)]).await?;
        Ok(())
    }

    async fn swap_off(&self, path: &Path) -> Result<()> {
        run("swapoff", &[path_arg(path)]).await?;
        Ok(())
    }

    async fn map_swapfile(&self, path: &Path) -> Result<String> {
        let path = path_arg(path);
        run("btrfs", &["inspect-internal", "map-swapfile", "-r", path.as_str()]).await
    }

    async fn extent_map(&self, path: &Path) -> Result<String> {
        run("filefrag", &["-v".to_string(), path_arg(path)]).await
    }

    async fn memory_total_mib(&self) -> Result<u64> {
        let meminfo = tokio::fs::read_to_string("/proc/meminfo").await?;
        parse_meminfo_total_mib(&meminfo)
            .ok_or_else(|| InstallError::precondition("MemTotal missing from /proc/meminfo"))
    }
}

#[async_trait]
impl HostOps for SystemDeviceOps {
    fn node_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    async fn install_base_system(
        &self,
        root: &Path,
        repo: &str,
        arch: &str,
        packages: &[String],
    ) -> Result<()> {
        copy_signing_keys(root).await?;

        let mut args = vec![
            "-S".to_string(),
            "-y".to_string(),
            "-r".to_string(),
            path_arg(root),
            "-R".to_string(),
            repo.to_string(),
        ];
        args.extend(packages.iter().cloned());

        info!(root = %root.display(), repo, arch, "installing base system");
        run_attached("xbps-install", &args, &[("XBPS_ARCH", arch)]).await
    }

    async fn run_in_root(
        &self,
        root: &Path,
        program: &str,
        environment: &[(String, String)],
    ) -> Result<()> {
        let root = root.to_path_buf();
        let program = program.to_string();
        let environment = environment.to_vec();
        let rendered = render("chroot", &[path_arg(&root), program.clone()]);
        debug!(command = %rendered, "running with cleared environment");

        let output = tokio::task::spawn_blocking(move || {
            duct::cmd("chroot", [root.into_os_string(), program.into()])
                .full_env(environment)
                .unchecked()
                .run()
        })
        .await
        .map_err(|error| InstallError::ExternalTool {
            command: rendered.clone(),
            status: "aborted".to_string(),
            stderr: error.to_string(),
        })?
        .map_err(|error| InstallError::ExternalTool {
            command: rendered.clone(),
            status: "not started".to_string(),
            stderr: error.to_string(),
        })?;

        if !output.status.success() {
            return Err(InstallError::ExternalTool {
                command: rendered,
                status: output.status.to_string(),
                stderr: "see terminal output".to_string(),
            });
        }
        Ok(())
    }

    async fn reconfigure(&self, args: &[&str]) -> Result<()> {
        run_attached("xbps-reconfigure", args, &[]).await
    }

    async fn install_bootloader(&self, efi_directory: &Path, bootloader_id: &str) -> Result<()> {
        let efi_directory = format!("--efi-directory={}", efi_directory.display());
        let bootloader_id = format!("--bootloader-id={bootloader_id}");
        run_attached("grub-install", &[efi_directory, bootloader_id], &[]).await
    }

    async fn write_boot_menu(&self, output: &Path) -> Result<()> {
        run_attached("grub-mkconfig", &["-o".to_string(), path_arg(output)], &[]).await
    }

    async fn reboot(&self) -> Result<()> {
        run::<&str>("reboot", &[]).await?;
        Ok(())
    }
}

/// Seed the target with the host's repository signing keys so the first
/// sync does not prompt for key import.
async fn copy_signing_keys(root: &Path) -> Result<()> {
    let source = Path::new("/").join(XBPS_KEYS);
    if !source.is_dir() {
        debug!(source = %source.display(), "no host signing keys to copy");
        return Ok(());
    }

    let destination = root.join(XBPS_KEYS);
    tokio::fs::create_dir_all(&destination).await?;

    let mut entries = tokio::fs::read_dir(&source).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            tokio::fs::copy(entry.path(), destination.join(entry.file_name())).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn truncate_then_restrict_leaves_empty_private_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swapfile");
        tokio::fs::write(&path, b"stale").await.unwrap();

        let ops = SystemDeviceOps::new();
        ops.truncate_file(&path).await.unwrap();
        ops.restrict_permissions(&path).await.unwrap();

        let metadata = std::fs::metadata(&path).unwrap();
        assert_eq!(metadata.len(), 0);
        assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn node_exists_reflects_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let ops = SystemDeviceOps::new();
        assert!(ops.node_exists(dir.path()));
        assert!(!ops.node_exists(&dir.path().join("missing")));
    }
}
