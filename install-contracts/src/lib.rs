// SPDX-License-Identifier: GPL-3.0-only

pub mod protocol;
pub mod traits;

pub use protocol::{InstallError, InstallErrorKind, Result};
pub use traits::{DeviceOps, FilesystemOps, HostOps, LuksOps, PartitionOps, SwapOps};
