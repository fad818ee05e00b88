// SPDX-License-Identifier: GPL-3.0-only

//! Test support for the installer
//!
//! [`FakeDeviceOps`] implements every device operation trait in memory and
//! records each call into a [`Ledger`], so provisioning flows can be checked
//! for ordering without touching a disk.

pub mod errors;
pub mod fake;
pub mod ledger;

pub use errors::{Result, TestingError};
pub use fake::FakeDeviceOps;
pub use ledger::{Call, Ledger};
