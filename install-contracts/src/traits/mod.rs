// SPDX-License-Identifier: GPL-3.0-only

//! Device operations capability
//!
//! Every side effect the installer has on disks, mounts and the host goes
//! through these traits. `install-sys` implements them with external tools;
//! `install-testing` records them in memory.

pub mod filesystem;
pub mod host;
pub mod luks;
pub mod partition;
pub mod swap;

pub use filesystem::FilesystemOps;
pub use host::HostOps;
pub use luks::LuksOps;
pub use partition::PartitionOps;
pub use swap::SwapOps;

/// Everything a provisioning run needs, as one object.
pub trait DeviceOps: PartitionOps + LuksOps + FilesystemOps + SwapOps + HostOps {}

impl<T> DeviceOps for T where T: PartitionOps + LuksOps + FilesystemOps + SwapOps + HostOps {}
