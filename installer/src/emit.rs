// SPDX-License-Identifier: GPL-3.0-only

//! fstab, resume override and crypttab from live mount state
//!
//! UUIDs come from the mounted filesystems, never from the partition plan.

use std::path::{Path, PathBuf};

use install_contracts::{DeviceOps, Result};
use install_types::{
    Fstab, LiveUuids, SubvolumeTree, SwapResumeInfo, apply_resume_override, crypttab_line,
};
use tracing::info;

/// What was written, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedConfig {
    pub uuids: LiveUuids,
    pub fstab: Fstab,
    pub resume: Option<SwapResumeInfo>,
}

pub struct ConfigEmitter<'a> {
    ops: &'a dyn DeviceOps,
    root: &'a Path,
    tree: &'a SubvolumeTree,
}

impl<'a> ConfigEmitter<'a> {
    pub fn new(ops: &'a dyn DeviceOps, root: &'a Path, tree: &'a SubvolumeTree) -> Self {
        Self { ops, root, tree }
    }

    fn etc(&self, name: &str) -> PathBuf {
        self.root.join("etc").join(name)
    }

    pub async fn live_uuids(&self) -> Result<LiveUuids> {
        Ok(LiveUuids {
            root: self.ops.filesystem_uuid(self.root).await?,
            esp: self.ops.filesystem_uuid(&self.root.join("efi")).await?,
            boot: self.ops.filesystem_uuid(&self.root.join("boot")).await?,
        })
    }

    /// Write fstab, the resume override and crypttab.
    pub async fn emit(
        &self,
        mount_options: &str,
        volume_name: &str,
        resume_offset: Option<u64>,
    ) -> Result<EmittedConfig> {
        let uuids = self.live_uuids().await?;

        let fstab = Fstab::standard(&uuids, self.tree, mount_options);
        write_file(&self.etc("fstab"), &fstab.render()).await?;

        let resume = resume_offset
            .map(|offset| SwapResumeInfo::new(&uuids.root, offset))
            .transpose()?;
        self.write_resume_override(resume.as_ref()).await?;

        let container_uuid = self.ops.luks_uuid(volume_name).await?;
        write_file(
            &self.etc("crypttab"),
            &crypttab_line(volume_name, &container_uuid),
        )
        .await?;

        info!(
            root_uuid = %uuids.root,
            hibernation = resume.is_some(),
            "configuration written"
        );
        Ok(EmittedConfig {
            uuids,
            fstab,
            resume,
        })
    }

    async fn write_resume_override(&self, resume: Option<&SwapResumeInfo>) -> Result<()> {
        let path = self.root.join("etc/default/grub");
        let existing = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(error) => return Err(error.into()),
        };
        write_file(&path, &apply_resume_override(&existing, resume)).await
    }
}

pub(crate) async fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use install_contracts::FilesystemOps;
    use install_testing::FakeDeviceOps;

    use super::*;

    const ROOT_UUID: &str = "0b7e7f0c-3f4e-4a8e-9c51-2f4c9c7a1d11";
    const LUKS_UUID: &str = "5d2c8a61-7c1e-4f7b-9a0e-3b8f3f3e6a42";

    async fn mounted(root: &Path) -> FakeDeviceOps {
        let fake = FakeDeviceOps::new()
            .with_device_uuid("/dev/mapper/cryptroot", ROOT_UUID)
            .with_device_uuid("/dev/sda1", "1A2B-3C4D")
            .with_device_uuid("/dev/sda2", "7f4d2b8e-0000-4000-8000-000000000002")
            .with_node("/dev/mapper/cryptroot")
            .with_luks_uuid("cryptroot", LUKS_UUID);
        fake.mount("/dev/mapper/cryptroot", root, Some("subvol=@"))
            .await
            .unwrap();
        fake.mount("/dev/sda2", &root.join("boot"), None)
            .await
            .unwrap();
        fake.mount("/dev/sda1", &root.join("efi"), None)
            .await
            .unwrap();
        fake
    }

    fn resume_lines(grub: &str) -> Vec<&str> {
        grub.lines()
            .filter(|line| line.contains("resume="))
            .collect()
    }

    #[tokio::test]
    async fn writes_fstab_override_and_crypttab() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let fake = mounted(root).await;
        let tree = SubvolumeTree::default();

        let emitted = ConfigEmitter::new(&fake, root, &tree)
            .emit("rw,noatime", "cryptroot", Some(1067264))
            .await
            .unwrap();

        let fstab = std::fs::read_to_string(root.join("etc/fstab")).unwrap();
        assert_eq!(fstab.lines().count(), 6);
        assert!(fstab.starts_with(&format!(
            "UUID={ROOT_UUID} / btrfs rw,noatime,subvol=@ 0 0\n"
        )));
        assert!(fstab.contains("UUID=1A2B-3C4D /efi vfat defaults 0 2\n"));

        let grub = std::fs::read_to_string(root.join("etc/default/grub")).unwrap();
        assert_eq!(
            resume_lines(&grub),
            vec![format!(
                "GRUB_CMDLINE_LINUX_DEFAULT=\"$GRUB_CMDLINE_LINUX_DEFAULT resume=UUID={ROOT_UUID} resume_offset=1067264\""
            )]
        );
        assert_eq!(emitted.resume.unwrap().offset, 1067264);

        let crypttab = std::fs::read_to_string(root.join("etc/crypttab")).unwrap();
        assert_eq!(crypttab, format!("cryptroot UUID={LUKS_UUID} none luks\n"));
    }

    #[tokio::test]
    async fn rerun_replaces_stale_override_and_keeps_fstab_identical() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("etc/default")).unwrap();
        std::fs::write(
            root.join("etc/default/grub"),
            "GRUB_TIMEOUT=5\nGRUB_CMDLINE_LINUX_DEFAULT=\"$GRUB_CMDLINE_LINUX_DEFAULT resume=UUID=old resume_offset=1\"\n",
        )
        .unwrap();
        let fake = mounted(root).await;
        let tree = SubvolumeTree::default();
        let emitter = ConfigEmitter::new(&fake, root, &tree);

        emitter.emit("rw", "cryptroot", Some(42)).await.unwrap();
        let first_fstab = std::fs::read(root.join("etc/fstab")).unwrap();
        emitter.emit("rw", "cryptroot", Some(42)).await.unwrap();

        assert_eq!(std::fs::read(root.join("etc/fstab")).unwrap(), first_fstab);
        let grub = std::fs::read_to_string(root.join("etc/default/grub")).unwrap();
        assert!(grub.starts_with("GRUB_TIMEOUT=5\n"));
        let lines = resume_lines(&grub);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("resume_offset=42\""));
    }

    #[tokio::test]
    async fn no_offset_removes_override_entirely() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("etc/default")).unwrap();
        std::fs::write(
            root.join("etc/default/grub"),
            "GRUB_CMDLINE_LINUX_DEFAULT=\"$GRUB_CMDLINE_LINUX_DEFAULT resume=UUID=old resume_offset=1\"\n",
        )
        .unwrap();
        let fake = mounted(root).await;
        let tree = SubvolumeTree::default();

        let emitted = ConfigEmitter::new(&fake, root, &tree)
            .emit("rw", "cryptroot", None)
            .await
            .unwrap();

        assert!(emitted.resume.is_none());
        let grub = std::fs::read_to_string(root.join("etc/default/grub")).unwrap();
        assert!(resume_lines(&grub).is_empty());
    }
}
