// SPDX-License-Identifier: GPL-3.0-only

use std::time::Duration;

use install_types::{HandoffError, InvalidUuid, LayoutError, ParseSizeError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification used for exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallErrorKind {
    Precondition,
    Timeout,
    ExternalTool,
    Io,
}

impl InstallErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Precondition => 2,
            Self::Timeout => 3,
            Self::ExternalTool => 4,
            Self::Io => 5,
        }
    }
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error(transparent)]
    InvalidSize(#[from] ParseSizeError),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("timed out after {waited:?} waiting for {what}")]
    DeviceTimeout { what: String, waited: Duration },

    #[error("{command} failed ({status}): {stderr}")]
    ExternalTool {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("handoff: {0}")]
    Handoff(#[from] HandoffError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl InstallError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    pub fn kind(&self) -> InstallErrorKind {
        match self {
            Self::InvalidSize(_) | Self::Precondition(_) | Self::Handoff(_) => {
                InstallErrorKind::Precondition
            }
            Self::DeviceTimeout { .. } => InstallErrorKind::Timeout,
            Self::ExternalTool { .. } => InstallErrorKind::ExternalTool,
            Self::Io(_) => InstallErrorKind::Io,
        }
    }
}

impl From<LayoutError> for InstallError {
    fn from(error: LayoutError) -> Self {
        Self::Precondition(error.to_string())
    }
}

impl From<InvalidUuid> for InstallError {
    fn from(error: InvalidUuid) -> Self {
        Self::Precondition(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, InstallError>;
