// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for the installer
//!
//! This crate defines the single source of truth for every value that flows
//! between provisioning stages:
//!
//! - **size**: human size strings (`200MiB`, `1GB`) converted to absolute MiB
//! - **layout**: the three-partition GPT plan and its `parted` script
//! - **device**: child partition naming for a parent block device
//! - **subvolume**: the btrfs subvolume tree and its mount points
//! - **fstab** / **resume**: generated configuration derived from live state
//! - **handoff**: the typed message passed into the second stage
//! - **config**: the immutable installation configuration
//!
//! Everything here is pure; nothing touches a device.

pub mod config;
pub mod crypttab;
pub mod device;
pub mod fstab;
pub mod handoff;
pub mod layout;
pub mod mount;
pub mod resume;
pub mod size;
pub mod subvolume;

pub use config::*;
pub use crypttab::*;
pub use device::*;
pub use fstab::*;
pub use handoff::*;
pub use layout::*;
pub use mount::*;
pub use resume::*;
pub use size::*;
pub use subvolume::*;
