// SPDX-License-Identifier: GPL-3.0-only

//! Configuration message passed into the second stage
//!
//! The message crosses the chroot boundary as exactly five environment
//! variables in an otherwise cleared environment. Only `PATH` is added.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const HOSTNAME_VAR: &str = "HOSTNAME";
pub const MOUNT_OPTIONS_VAR: &str = "BTRFS_OPTS";
pub const ESP_DEVICE_VAR: &str = "ESP_DEVICE";
pub const BOOT_DEVICE_VAR: &str = "BOOT_DEVICE";
pub const VOLUME_NAME_VAR: &str = "LUKS_NAME";

/// Command search path inside the new root.
pub const STAGE_TWO_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandoffError {
    #[error("required variable {0} is not set")]
    Missing(&'static str),
    #[error("required variable {0} is empty")]
    Empty(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffMessage {
    pub hostname: String,
    pub mount_options: String,
    pub esp_device: String,
    pub boot_device: String,
    pub volume_name: String,
}

impl HandoffMessage {
    pub const VARIABLES: [&'static str; 5] = [
        HOSTNAME_VAR,
        MOUNT_OPTIONS_VAR,
        ESP_DEVICE_VAR,
        BOOT_DEVICE_VAR,
        VOLUME_NAME_VAR,
    ];

    pub fn to_vars(&self) -> [(&'static str, &str); 5] {
        [
            (HOSTNAME_VAR, self.hostname.as_str()),
            (MOUNT_OPTIONS_VAR, self.mount_options.as_str()),
            (ESP_DEVICE_VAR, self.esp_device.as_str()),
            (BOOT_DEVICE_VAR, self.boot_device.as_str()),
            (VOLUME_NAME_VAR, self.volume_name.as_str()),
        ]
    }

    /// The complete environment for the second stage: the five variables plus `PATH`.
    pub fn environment(&self) -> Vec<(String, String)> {
        let mut environment: Vec<(String, String)> = self
            .to_vars()
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        environment.push(("PATH".to_string(), STAGE_TWO_PATH.to_string()));
        environment
    }

    /// Rebuild the message from an environment. Unrelated variables are ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, HandoffError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut values: [Option<String>; 5] = Default::default();
        for (key, value) in vars {
            if let Some(index) = Self::VARIABLES.iter().position(|name| *name == key.as_ref()) {
                values[index] = Some(value.into());
            }
        }

        let mut take = |index: usize| -> Result<String, HandoffError> {
            let name = Self::VARIABLES[index];
            let value = values[index].take().ok_or(HandoffError::Missing(name))?;
            if value.trim().is_empty() {
                return Err(HandoffError::Empty(name));
            }
            Ok(value)
        };

        Ok(Self {
            hostname: take(0)?,
            mount_options: take(1)?,
            esp_device: take(2)?,
            boot_device: take(3)?,
            volume_name: take(4)?,
        })
    }
}
