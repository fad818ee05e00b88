// SPDX-License-Identifier: GPL-3.0-only

//! Second-stage configurator, run inside the new root

use std::path::PathBuf;

use install_contracts::{DeviceOps, InstallError, Result};
use install_types::{HandoffMessage, SubvolumeTree, source_of};
use tracing::{debug, info};

use crate::emit::{ConfigEmitter, EmittedConfig, write_file};
use crate::swap::SwapProvisioner;

const RC_CONF: &str = "\
# Generated by crypt-install. Edited copies are never overwritten.
HARDWARECLOCK=\"UTC\"
TIMEZONE=\"UTC\"
KEYMAP=\"us\"
";

const LOCALE_LINE: &str = "en_US.UTF-8 UTF-8";

pub struct Configurator<'a> {
    ops: &'a dyn DeviceOps,
    root: PathBuf,
    message: HandoffMessage,
    tree: SubvolumeTree,
}

impl<'a> Configurator<'a> {
    /// `root` is `/` when running inside the chroot.
    pub fn new(ops: &'a dyn DeviceOps, root: impl Into<PathBuf>, message: HandoffMessage) -> Self {
        Self {
            ops,
            root: root.into(),
            message,
            tree: SubvolumeTree::default(),
        }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub async fn run(&self) -> Result<EmittedConfig> {
        self.verify_boot_mounts().await?;
        self.write_hostname().await?;
        self.write_rc_conf().await?;
        self.configure_locale().await?;

        let resume_offset = SwapProvisioner::new(self.ops, &self.root, &self.tree)
            .provision()
            .await?;
        let emitted = ConfigEmitter::new(self.ops, &self.root, &self.tree)
            .emit(
                &self.message.mount_options,
                &self.message.volume_name,
                resume_offset,
            )
            .await?;

        info!("installing bootloader");
        self.ops
            .install_bootloader(&self.path("efi"), &self.message.hostname)
            .await?;
        self.ops
            .write_boot_menu(&self.path("boot/grub/grub.cfg"))
            .await?;
        self.ops.reconfigure(&["-fa"]).await?;

        info!(hostname = %self.message.hostname, "stage two complete");
        Ok(emitted)
    }

    /// `/boot` and `/efi` must come from the partitions stage one handed over.
    pub async fn verify_boot_mounts(&self) -> Result<()> {
        let mounts = self.ops.mounts().await?;
        for (mount_point, expected) in [
            ("boot", &self.message.boot_device),
            ("efi", &self.message.esp_device),
        ] {
            let target = self.path(mount_point);
            match source_of(&mounts, &target) {
                Some(source) if source == expected.as_str() => {
                    debug!(target = %target.display(), source, "boot mount verified");
                }
                Some(source) => {
                    return Err(InstallError::precondition(format!(
                        "{} is mounted from {source}, expected {expected}",
                        target.display()
                    )));
                }
                None => {
                    return Err(InstallError::precondition(format!(
                        "{} is not mounted",
                        target.display()
                    )));
                }
            }
        }
        Ok(())
    }

    async fn write_hostname(&self) -> Result<()> {
        write_file(
            &self.path("etc/hostname"),
            &format!("{}\n", self.message.hostname),
        )
        .await
    }

    async fn write_rc_conf(&self) -> Result<()> {
        let path = self.path("etc/rc.conf");
        if tokio::fs::try_exists(&path).await? {
            debug!(path = %path.display(), "keeping existing rc.conf");
            return Ok(());
        }
        write_file(&path, RC_CONF).await
    }

    /// glibc only; musl roots have no locale list.
    async fn configure_locale(&self) -> Result<()> {
        let path = self.path("etc/default/libc-locales");
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!("no libc-locales; skipping locale generation");
                return Ok(());
            }
            Err(error) => return Err(error.into()),
        };

        write_file(&path, &enable_locale(&contents, LOCALE_LINE)).await?;
        self.ops.reconfigure(&["-f", "glibc-locales"]).await
    }
}

/// Uncomment `locale` in a libc-locales list, leaving everything else alone.
fn enable_locale(contents: &str, locale: &str) -> String {
    contents
        .lines()
        .map(|line| {
            let uncommented = line.trim_start_matches('#').trim_start();
            if uncommented == locale {
                format!("{locale}\n")
            } else {
                format!("{line}\n")
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enables_only_the_requested_locale() {
        let list = "#en_GB.UTF-8 UTF-8\n#en_US.UTF-8 UTF-8\n#en_US ISO-8859-1\n";
        assert_eq!(
            enable_locale(list, LOCALE_LINE),
            "#en_GB.UTF-8 UTF-8\nen_US.UTF-8 UTF-8\n#en_US ISO-8859-1\n"
        );
    }

    #[test]
    fn already_enabled_locale_is_unchanged() {
        let list = "en_US.UTF-8 UTF-8\n";
        assert_eq!(enable_locale(list, LOCALE_LINE), list);
    }
}
