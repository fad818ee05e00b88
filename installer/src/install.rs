// SPDX-License-Identifier: GPL-3.0-only

//! Stage one: the provisioning state machine
//!
//! Strictly linear. Each step needs the observable result of the one before
//! it, and nothing after partitioning can be undone.

use std::path::PathBuf;

use install_contracts::{DeviceOps, InstallError, Result};
use install_types::{DiskLayout, InstallConfig, PartitionRole, SubvolumeTree};
use serde::Serialize;
use tracing::{error, info};

use crate::filesystem::FilesystemProvisioner;
use crate::handoff;
use crate::luks::{self, EncryptedVolume, VolumeState};
use crate::partition;
use crate::preflight;
use crate::teardown::{Acquired, TeardownReport, teardown};

/// Everything a run would do, for `--print-plan`.
#[derive(Debug, Clone, Serialize)]
pub struct InstallPlan {
    pub config: InstallConfig,
    pub layout: DiskLayout,
    pub subvolumes: SubvolumeTree,
    pub repository: String,
    pub architecture: String,
    pub packages: Vec<String>,
}

impl InstallPlan {
    pub fn new(config: &InstallConfig) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            layout: config.layout()?,
            subvolumes: SubvolumeTree::default(),
            repository: config.effective_repo(),
            architecture: config.effective_arch(),
            packages: config.package_set(),
        })
    }
}

pub struct Installer<'a> {
    ops: &'a dyn DeviceOps,
    config: &'a InstallConfig,
    stage_two: PathBuf,
    tree: SubvolumeTree,
    acquired: Acquired,
}

impl<'a> Installer<'a> {
    /// `stage_two` is the second-stage binary on the live host.
    pub fn new(ops: &'a dyn DeviceOps, config: &'a InstallConfig, stage_two: PathBuf) -> Self {
        Self {
            ops,
            config,
            stage_two,
            tree: SubvolumeTree::default(),
            acquired: Acquired::default(),
        }
    }

    /// Non-destructive checks. Returns the layout to confirm and write.
    pub async fn preflight(&self) -> Result<DiskLayout> {
        if !self.stage_two.is_file() {
            return Err(InstallError::precondition(format!(
                "second-stage binary not found at {}",
                self.stage_two.display()
            )));
        }
        preflight::device_checks(self.ops, self.config).await
    }

    /// Provision, hand off, tear down, and reboot when everything was released.
    ///
    /// A provisioning error is returned after teardown; teardown problems on
    /// their own are reported, not raised.
    pub async fn run(&mut self, layout: &DiskLayout) -> Result<TeardownReport> {
        let outcome = self.provision(layout).await;
        let report = teardown(self.ops, &self.acquired).await;

        if let Err(error) = outcome {
            error!(%error, "installation failed");
            if !report.is_clean() {
                error!(%report, "cleanup incomplete");
            }
            return Err(error);
        }

        if !report.is_clean() {
            error!(%report, "cleanup incomplete; not rebooting");
        } else if self.config.reboot {
            info!("rebooting");
            self.ops.reboot().await?;
        }
        Ok(report)
    }

    async fn provision(&mut self, layout: &DiskLayout) -> Result<()> {
        let config = self.config;
        let root = &config.target_root;

        partition::write_layout(self.ops, config, layout).await?;

        let mut volume = EncryptedVolume::new(
            config.partition_device(PartitionRole::Root),
            config.volume_name.clone(),
        );
        let provisioned = luks::provision(self.ops, &mut volume, config.key_size, config.poll).await;
        if volume.state() == VolumeState::Open {
            self.acquired.mapping = Some(volume.name().to_string());
        }
        let mapped = provisioned?;

        let filesystems = FilesystemProvisioner::new(self.ops, config, &self.tree);
        filesystems.format(&mapped).await?;
        self.acquired.mount_root = Some(config.scratch_mount.clone());
        filesystems.create_top_level(&mapped).await?;
        self.acquired.mount_root = None;
        filesystems.mount_root(&mapped).await?;
        // Everything from here on hangs off the target root.
        self.acquired.mount_root = Some(root.clone());
        filesystems.populate_root(&mapped).await?;
        filesystems.mount_boot().await?;

        info!(repo = %config.effective_repo(), "installing base system");
        self.ops
            .install_base_system(
                root,
                &config.effective_repo(),
                &config.effective_arch(),
                &config.package_set(),
            )
            .await?;

        handoff::stage_binary(&self.stage_two, root).await?;
        handoff::bind_virtual_filesystems(self.ops, root).await?;
        self.acquired.swap_file = Some(self.tree.swap_file(root));
        handoff::enter(self.ops, root, &config.handoff_message()).await?;

        info!(disk = %config.disk, "installation complete");
        Ok(())
    }
}
