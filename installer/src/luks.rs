// SPDX-License-Identifier: GPL-3.0-only

//! LUKS2 container lifecycle for the root partition

use std::path::Path;

use install_contracts::{DeviceOps, InstallError, Result};
use install_sys::poll_until;
use install_types::{PollSettings, mapper_path};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeState {
    Closed,
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedVolume {
    backing: String,
    name: String,
    state: VolumeState,
}

impl EncryptedVolume {
    pub fn new(backing: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            backing: backing.into(),
            name: name.into(),
            state: VolumeState::Closed,
        }
    }

    pub fn backing(&self) -> &str {
        &self.backing
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> VolumeState {
        self.state
    }

    pub fn mapped_path(&self) -> String {
        mapper_path(&self.name)
    }

    /// Irreversibly format the backing partition. Prompts for a passphrase.
    pub async fn format(&self, ops: &dyn DeviceOps, key_size: u32) -> Result<()> {
        if self.state == VolumeState::Open {
            return Err(InstallError::precondition(format!(
                "{} is open; refusing to format",
                self.name
            )));
        }
        info!(partition = %self.backing, key_size, "formatting LUKS2 container");
        ops.luks_format(&self.backing, key_size).await
    }

    /// Unlock the container. A failed unlock is treated as bad input.
    pub async fn open(&mut self, ops: &dyn DeviceOps) -> Result<()> {
        if let Err(error) = ops.luks_open(&self.backing, &self.name).await {
            warn!(partition = %self.backing, %error, "unlock failed");
            return Err(InstallError::precondition(format!(
                "unlocking {} failed: {error}",
                self.backing
            )));
        }
        self.state = VolumeState::Open;
        Ok(())
    }

    /// Wait for the mapped node and return its path.
    pub async fn await_ready(&self, ops: &dyn DeviceOps, poll: PollSettings) -> Result<String> {
        if self.state != VolumeState::Open {
            return Err(InstallError::precondition(format!(
                "{} has not been opened",
                self.name
            )));
        }
        let mapped = self.mapped_path();
        poll_until(&mapped, poll, || ops.node_exists(Path::new(&mapped))).await?;
        Ok(mapped)
    }

    pub async fn close(&mut self, ops: &dyn DeviceOps) -> Result<()> {
        ops.luks_close(&self.name).await?;
        self.state = VolumeState::Closed;
        Ok(())
    }
}

/// Format, open, wait for the mapped node, then clear stale signatures on it.
pub async fn provision(
    ops: &dyn DeviceOps,
    volume: &mut EncryptedVolume,
    key_size: u32,
    poll: PollSettings,
) -> Result<String> {
    volume.format(ops, key_size).await?;
    volume.open(ops).await?;
    let mapped = volume.await_ready(ops, poll).await?;
    ops.wipe_signatures(&mapped).await?;
    info!(mapped = %mapped, "encrypted volume ready");
    Ok(mapped)
}
