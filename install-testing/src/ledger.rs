// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::path::{Path, PathBuf};

use install_types::FilesystemKind;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, TestingError};

/// One recorded device operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Call {
    DeviceSize { disk: String },
    WritePartitionTable { disk: String, script: Vec<String> },
    Settle,
    LuksFormat { partition: String, key_size: u32 },
    LuksOpen { partition: String, name: String },
    LuksClose { name: String },
    LuksUuid { name: String },
    WipeSignatures { device: String },
    MakeFilesystem { device: String, kind: FilesystemKind, label: String },
    Mount { source: String, target: PathBuf, options: Option<String> },
    UnmountRecursive { target: PathBuf },
    BindRslave { source: PathBuf, target: PathBuf },
    CreateSubvolume { path: PathBuf },
    FilesystemUuid { mount_point: PathBuf },
    TruncateFile { path: PathBuf },
    DisableCow { path: PathBuf },
    DisableCompression { path: PathBuf },
    Allocate { path: PathBuf, size_mib: u64 },
    RestrictPermissions { path: PathBuf },
    MakeSwap { path: PathBuf },
    SwapOn { path: PathBuf },
    SwapOff { path: PathBuf },
    MapSwapfile { path: PathBuf },
    ExtentMap { path: PathBuf },
    MemoryTotal,
    InstallBaseSystem { root: PathBuf, repo: String, arch: String, packages: Vec<String> },
    RunInRoot { root: PathBuf, program: String, environment: Vec<(String, String)> },
    Reconfigure { args: Vec<String> },
    InstallBootloader { efi_directory: PathBuf, bootloader_id: String },
    WriteBootMenu { output: PathBuf },
    Reboot,
}

impl Call {
    /// Stable operation name, matching the serialized `op` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Call::DeviceSize { .. } => "device_size",
            Call::WritePartitionTable { .. } => "write_partition_table",
            Call::Settle => "settle",
            Call::LuksFormat { .. } => "luks_format",
            Call::LuksOpen { .. } => "luks_open",
            Call::LuksClose { .. } => "luks_close",
            Call::LuksUuid { .. } => "luks_uuid",
            Call::WipeSignatures { .. } => "wipe_signatures",
            Call::MakeFilesystem { .. } => "make_filesystem",
            Call::Mount { .. } => "mount",
            Call::UnmountRecursive { .. } => "unmount_recursive",
            Call::BindRslave { .. } => "bind_rslave",
            Call::CreateSubvolume { .. } => "create_subvolume",
            Call::FilesystemUuid { .. } => "filesystem_uuid",
            Call::TruncateFile { .. } => "truncate_file",
            Call::DisableCow { .. } => "disable_cow",
            Call::DisableCompression { .. } => "disable_compression",
            Call::Allocate { .. } => "allocate",
            Call::RestrictPermissions { .. } => "restrict_permissions",
            Call::MakeSwap { .. } => "make_swap",
            Call::SwapOn { .. } => "swap_on",
            Call::SwapOff { .. } => "swap_off",
            Call::MapSwapfile { .. } => "map_swapfile",
            Call::ExtentMap { .. } => "extent_map",
            Call::MemoryTotal => "memory_total",
            Call::InstallBaseSystem { .. } => "install_base_system",
            Call::RunInRoot { .. } => "run_in_root",
            Call::Reconfigure { .. } => "reconfigure",
            Call::InstallBootloader { .. } => "install_bootloader",
            Call::WriteBootMenu { .. } => "write_boot_menu",
            Call::Reboot => "reboot",
        }
    }
}

/// Ordered record of every call made against a fake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub calls: Vec<Call>,
}

impl Ledger {
    pub fn names(&self) -> Vec<&'static str> {
        self.calls.iter().map(Call::name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls.iter().filter(|call| call.name() == name).count()
    }

    /// Index of the first call matching `predicate`.
    pub fn position<F>(&self, predicate: F) -> Option<usize>
    where
        F: Fn(&Call) -> bool,
    {
        self.calls.iter().position(predicate)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.position(|call| call.name() == name)
    }

    /// Panics unless the first `earlier` call precedes the first `later` call.
    pub fn assert_before(&self, earlier: &str, later: &str) {
        let first = self
            .index_of(earlier)
            .unwrap_or_else(|| panic!("{earlier} never called: {:?}", self.names()));
        let second = self
            .index_of(later)
            .unwrap_or_else(|| panic!("{later} never called: {:?}", self.names()));
        assert!(
            first < second,
            "{earlier} (#{first}) should precede {later} (#{second}): {:?}",
            self.names()
        );
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|error| TestingError::LedgerIo {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;

        fs::write(path, content).map_err(|error| TestingError::LedgerIo {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|error| TestingError::LedgerIo {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;

        serde_json::from_str(&raw).map_err(|error| TestingError::LedgerIo {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Ledger {
        Ledger {
            calls: vec![
                Call::Settle,
                Call::LuksClose {
                    name: "cryptroot".to_string(),
                },
                Call::Settle,
            ],
        }
    }

    #[test]
    fn counts_and_orders_calls() {
        let ledger = sample();
        assert_eq!(ledger.count("settle"), 2);
        assert_eq!(ledger.index_of("luks_close"), Some(1));
        ledger.assert_before("settle", "luks_close");
    }

    #[test]
    fn serialized_tag_matches_name() {
        let json = serde_json::to_value(Call::LuksClose {
            name: "cryptroot".to_string(),
        })
        .unwrap();
        assert_eq!(json["op"], "luks_close");
    }

    #[test]
    fn persists_and_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        sample().save(&path).unwrap();
        assert_eq!(Ledger::load(&path).unwrap(), sample());
    }
}
