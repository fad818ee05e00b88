// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TestingError {
    #[error("ledger io error for {path:?}: {reason}")]
    LedgerIo { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, TestingError>;
