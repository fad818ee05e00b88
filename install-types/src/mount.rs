// SPDX-License-Identifier: GPL-3.0-only

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One line of live mount state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountRecord {
    pub source: String,
    pub mount_point: PathBuf,
    pub fs_type: String,
}

/// Source device of whatever is mounted exactly at `mount_point`.
///
/// Later records shadow earlier ones, matching kernel semantics.
pub fn source_of<'a>(mounts: &'a [MountRecord], mount_point: &Path) -> Option<&'a str> {
    mounts
        .iter()
        .rev()
        .find(|record| record.mount_point == mount_point)
        .map(|record| record.source.as_str())
}
