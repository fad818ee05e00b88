// SPDX-License-Identifier: GPL-3.0-only

//! Encrypted btrfs installer
//!
//! Stage one (`crypt-install`) partitions the target disk, builds the LUKS2
//! container and subvolume tree, installs the base system and hands off into
//! the new root. Stage two (`crypt-install-stage2`) runs inside that root and
//! finalizes swap, fstab, crypttab and the bootloader.
//!
//! Every device side effect goes through [`install_contracts::DeviceOps`].

pub mod cli;
pub mod config;
pub mod emit;
pub mod filesystem;
pub mod handoff;
pub mod install;
pub mod logging;
pub mod luks;
pub mod partition;
pub mod preflight;
pub mod stage_two;
pub mod swap;
pub mod teardown;

use install_contracts::InstallError;

pub use install::{InstallPlan, Installer};
pub use stage_two::Configurator;
pub use teardown::TeardownReport;

/// Exit code for a run that failed with `error`.
///
/// Typed installer errors map onto their kind; anything else is 1.
pub fn exit_code(error: &anyhow::Error) -> u8 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<InstallError>())
        .map(|error| error.kind().exit_code())
        .unwrap_or(1)
}
