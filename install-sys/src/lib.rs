// SPDX-License-Identifier: GPL-3.0-only

//! Low-level system operations for the installer
//!
//! This crate implements the device operation traits by shelling out to the
//! standard Linux storage tools (`parted`, `cryptsetup`, `mkfs.*`, `btrfs`,
//! `mount`, ...) and by reading kernel state from `/proc`.
//!
//! Every operation here is destructive or privileged and must run as root.

pub mod cmd;
pub mod mounts;
pub mod poll;
pub mod probe;
pub mod system;
pub mod tools;

pub use mounts::{parse_mountinfo, read_mounts};
pub use poll::poll_until;
pub use system::SystemDeviceOps;
pub use tools::{INSTALL_TOOLS, STAGE_TWO_TOOLS, missing_tools};
