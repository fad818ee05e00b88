// SPDX-License-Identifier: GPL-3.0-only

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use install_contracts::{
    FilesystemOps, HostOps, InstallError, LuksOps, PartitionOps, Result, SwapOps,
};
use install_types::{FilesystemKind, MountRecord, mapper_path, partition_path};

use crate::ledger::{Call, Ledger};

const PARTITION_COUNT: u32 = 3;

#[derive(Debug)]
struct State {
    ledger: Ledger,
    mounts: Vec<MountRecord>,
    nodes: HashSet<PathBuf>,
    /// Polls remaining before a created node becomes visible.
    pending: HashMap<PathBuf, u32>,
    delays: HashMap<PathBuf, u32>,
    filesystems: HashMap<String, FilesystemKind>,
    device_uuids: HashMap<String, String>,
    luks_uuids: HashMap<String, String>,
    active_swaps: HashSet<PathBuf>,
    failures: HashMap<&'static str, String>,
    mount_failures: HashMap<PathBuf, String>,
    device_size_mib: Option<u64>,
    memory_mib: u64,
    map_swapfile_output: Option<String>,
    extent_map_output: Option<String>,
    next_uuid: u64,
}

impl State {
    fn create_node(&mut self, path: PathBuf) {
        match self.delays.get(&path) {
            Some(&polls) if polls > 0 => {
                self.pending.insert(path, polls);
            }
            _ => {
                self.nodes.insert(path);
            }
        }
    }

    fn generated_uuid(&mut self) -> String {
        self.next_uuid += 1;
        format!("00000000-0000-4000-8000-{:012x}", self.next_uuid)
    }
}

/// In-memory [`install_contracts::DeviceOps`] with a call ledger.
///
/// Partition nodes appear when a table is written, mapped devices appear on
/// open, and filesystem UUIDs are generated per device unless scripted.
#[derive(Debug)]
pub struct FakeDeviceOps {
    state: Mutex<State>,
}

impl Default for FakeDeviceOps {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDeviceOps {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                ledger: Ledger::default(),
                mounts: Vec::new(),
                nodes: HashSet::new(),
                pending: HashMap::new(),
                delays: HashMap::new(),
                filesystems: HashMap::new(),
                device_uuids: HashMap::new(),
                luks_uuids: HashMap::new(),
                active_swaps: HashSet::new(),
                failures: HashMap::new(),
                mount_failures: HashMap::new(),
                device_size_mib: Some(20 * 1024),
                memory_mib: 4096,
                map_swapfile_output: Some("1234\n".to_string()),
                extent_map_output: None,
                next_uuid: 0,
            }),
        }
    }

    pub fn with_device_size(self, size_mib: Option<u64>) -> Self {
        self.state().device_size_mib = size_mib;
        self
    }

    pub fn with_memory_mib(self, memory_mib: u64) -> Self {
        self.state().memory_mib = memory_mib;
        self
    }

    /// A mount that already exists before the run starts.
    pub fn with_mount(self, source: &str, mount_point: &str, fs_type: &str) -> Self {
        self.state().mounts.push(MountRecord {
            source: source.to_string(),
            mount_point: PathBuf::from(mount_point),
            fs_type: fs_type.to_string(),
        });
        self
    }

    pub fn with_node(self, path: impl Into<PathBuf>) -> Self {
        self.state().nodes.insert(path.into());
        self
    }

    /// Delay visibility of `path` by `polls` checks after it is created.
    pub fn with_node_delay(self, path: impl Into<PathBuf>, polls: u32) -> Self {
        self.state().delays.insert(path.into(), polls);
        self
    }

    /// `path` never becomes visible.
    pub fn with_missing_node(self, path: impl Into<PathBuf>) -> Self {
        self.with_node_delay(path, u32::MAX)
    }

    /// A swap file that is already active, as left behind by the second stage.
    pub fn with_active_swap(self, path: impl Into<PathBuf>) -> Self {
        self.state().active_swaps.insert(path.into());
        self
    }

    pub fn with_device_uuid(self, device: &str, uuid: &str) -> Self {
        self.state()
            .device_uuids
            .insert(device.to_string(), uuid.to_string());
        self
    }

    pub fn with_luks_uuid(self, name: &str, uuid: &str) -> Self {
        self.state()
            .luks_uuids
            .insert(name.to_string(), uuid.to_string());
        self
    }

    /// Scripted output of the swap file offset query; `None` makes it fail.
    pub fn with_map_swapfile_output(self, output: Option<&str>) -> Self {
        self.state().map_swapfile_output = output.map(ToString::to_string);
        self
    }

    pub fn with_extent_map_output(self, output: Option<&str>) -> Self {
        self.state().extent_map_output = output.map(ToString::to_string);
        self
    }

    /// Every call named `op` fails with `stderr` after being recorded.
    pub fn fail_on(self, op: &'static str, stderr: &str) -> Self {
        self.state().failures.insert(op, stderr.to_string());
        self
    }

    /// Only mounts onto `target` fail; other mounts go through.
    pub fn fail_mount_at(self, target: impl Into<PathBuf>, stderr: &str) -> Self {
        self.state()
            .mount_failures
            .insert(target.into(), stderr.to_string());
        self
    }

    pub fn ledger(&self) -> Ledger {
        self.state().ledger.clone()
    }

    pub fn mounts_snapshot(&self) -> Vec<MountRecord> {
        self.state().mounts.clone()
    }

    pub fn active_swaps(&self) -> Vec<PathBuf> {
        self.state().active_swaps.iter().cloned().collect()
    }

    pub fn is_mapped(&self, name: &str) -> bool {
        self.state().nodes.contains(Path::new(&mapper_path(name)))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: Call) -> Result<MutexGuard<'_, State>> {
        let name = call.name();
        let mut state = self.state();
        state.ledger.calls.push(call);
        if let Some(stderr) = state.failures.get(name) {
            return Err(tool_failure(name, stderr));
        }
        Ok(state)
    }
}

fn tool_failure(command: &str, stderr: &str) -> InstallError {
    InstallError::ExternalTool {
        command: command.to_string(),
        status: "exit status: 1".to_string(),
        stderr: stderr.to_string(),
    }
}

#[async_trait]
impl PartitionOps for FakeDeviceOps {
    async fn device_size_mib(&self, disk: &str) -> Option<u64> {
        let state = self
            .record(Call::DeviceSize {
                disk: disk.to_string(),
            })
            .ok()?;
        state.device_size_mib
    }

    async fn write_partition_table(&self, disk: &str, script: &[String]) -> Result<()> {
        let mut state = self.record(Call::WritePartitionTable {
            disk: disk.to_string(),
            script: script.to_vec(),
        })?;
        for index in 1..=PARTITION_COUNT {
            state.create_node(PathBuf::from(partition_path(disk, index)));
        }
        Ok(())
    }

    async fn settle(&self) -> Result<()> {
        self.record(Call::Settle)?;
        Ok(())
    }
}

#[async_trait]
impl LuksOps for FakeDeviceOps {
    async fn luks_format(&self, partition: &str, key_size: u32) -> Result<()> {
        self.record(Call::LuksFormat {
            partition: partition.to_string(),
            key_size,
        })?;
        Ok(())
    }

    async fn luks_open(&self, partition: &str, name: &str) -> Result<()> {
        let mut state = self.record(Call::LuksOpen {
            partition: partition.to_string(),
            name: name.to_string(),
        })?;
        state.create_node(PathBuf::from(mapper_path(name)));
        Ok(())
    }

    async fn luks_close(&self, name: &str) -> Result<()> {
        let mut state = self.record(Call::LuksClose {
            name: name.to_string(),
        })?;
        let node = PathBuf::from(mapper_path(name));
        if !state.nodes.remove(&node) {
            return Err(tool_failure(
                "cryptsetup close",
                &format!("Device {name} is not active."),
            ));
        }
        Ok(())
    }

    async fn luks_uuid(&self, name: &str) -> Result<String> {
        let mut state = self.record(Call::LuksUuid {
            name: name.to_string(),
        })?;
        if !state.nodes.contains(Path::new(&mapper_path(name))) {
            return Err(tool_failure(
                "cryptsetup status",
                &format!("{name} is inactive."),
            ));
        }
        if let Some(uuid) = state.luks_uuids.get(name) {
            return Ok(uuid.clone());
        }
        let uuid = state.generated_uuid();
        state.luks_uuids.insert(name.to_string(), uuid.clone());
        Ok(uuid)
    }
}

#[async_trait]
impl FilesystemOps for FakeDeviceOps {
    async fn wipe_signatures(&self, device: &str) -> Result<()> {
        let mut state = self.record(Call::WipeSignatures {
            device: device.to_string(),
        })?;
        state.filesystems.remove(device);
        Ok(())
    }

    async fn make_filesystem(
        &self,
        device: &str,
        kind: FilesystemKind,
        label: &str,
    ) -> Result<()> {
        let mut state = self.record(Call::MakeFilesystem {
            device: device.to_string(),
            kind,
            label: label.to_string(),
        })?;
        state.filesystems.insert(device.to_string(), kind);
        state.device_uuids.remove(device);
        Ok(())
    }

    async fn mount(&self, source: &str, target: &Path, options: Option<&str>) -> Result<()> {
        let mut state = self.record(Call::Mount {
            source: source.to_string(),
            target: target.to_path_buf(),
            options: options.map(ToString::to_string),
        })?;
        if let Some(stderr) = state.mount_failures.get(target) {
            return Err(tool_failure("mount", stderr));
        }
        let fs_type = state
            .filesystems
            .get(source)
            .map(|kind| kind.fstab_type().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        state.mounts.push(MountRecord {
            source: source.to_string(),
            mount_point: target.to_path_buf(),
            fs_type,
        });
        state.nodes.insert(target.to_path_buf());
        Ok(())
    }

    async fn unmount_recursive(&self, target: &Path) -> Result<()> {
        let mut state = self.record(Call::UnmountRecursive {
            target: target.to_path_buf(),
        })?;
        let before = state.mounts.len();
        state
            .mounts
            .retain(|record| !record.mount_point.starts_with(target));
        if state.mounts.len() == before {
            return Err(tool_failure(
                "umount -R",
                &format!("{}: not mounted.", target.display()),
            ));
        }
        Ok(())
    }

    async fn bind_rslave(&self, source: &Path, target: &Path) -> Result<()> {
        let mut state = self.record(Call::BindRslave {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
        })?;
        state.mounts.push(MountRecord {
            source: source.to_string_lossy().into_owned(),
            mount_point: target.to_path_buf(),
            fs_type: "none".to_string(),
        });
        Ok(())
    }

    async fn create_subvolume(&self, path: &Path) -> Result<()> {
        let mut state = self.record(Call::CreateSubvolume {
            path: path.to_path_buf(),
        })?;
        state.nodes.insert(path.to_path_buf());
        Ok(())
    }

    async fn filesystem_uuid(&self, mount_point: &Path) -> Result<String> {
        let mut state = self.record(Call::FilesystemUuid {
            mount_point: mount_point.to_path_buf(),
        })?;
        let source = install_types::source_of(&state.mounts, mount_point)
            .map(ToString::to_string)
            .ok_or_else(|| {
                InstallError::precondition(format!(
                    "no filesystem UUID reported for {}",
                    mount_point.display()
                ))
            })?;
        if let Some(uuid) = state.device_uuids.get(&source) {
            return Ok(uuid.clone());
        }
        let uuid = state.generated_uuid();
        state.device_uuids.insert(source, uuid.clone());
        Ok(uuid)
    }

    async fn mounts(&self) -> Result<Vec<MountRecord>> {
        Ok(self.state().mounts.clone())
    }
}

#[async_trait]
impl SwapOps for FakeDeviceOps {
    async fn truncate_file(&self, path: &Path) -> Result<()> {
        self.record(Call::TruncateFile {
            path: path.to_path_buf(),
        })?;
        Ok(())
    }

    async fn disable_cow(&self, path: &Path) -> Result<()> {
        self.record(Call::DisableCow {
            path: path.to_path_buf(),
        })?;
        Ok(())
    }

    async fn disable_compression(&self, path: &Path) -> Result<()> {
        self.record(Call::DisableCompression {
            path: path.to_path_buf(),
        })?;
        Ok(())
    }

    async fn allocate(&self, path: &Path, size_mib: u64) -> Result<()> {
        self.record(Call::Allocate {
            path: path.to_path_buf(),
            size_mib,
        })?;
        Ok(())
    }

    async fn restrict_permissions(&self, path: &Path) -> Result<()> {
        self.record(Call::RestrictPermissions {
            path: path.to_path_buf(),
        })?;
        Ok(())
    }

    async fn make_swap(&self, path: &Path) -> Result<()> {
        self.record(Call::MakeSwap {
            path: path.to_path_buf(),
        })?;
        Ok(())
    }

    async fn swap_on(&self, path: &Path) -> Result<()> {
        let mut state = self.record(Call::SwapOn {
            path: path.to_path_buf(),
        })?;
        state.active_swaps.insert(path.to_path_buf());
        Ok(())
    }

    async fn swap_off(&self, path: &Path) -> Result<()> {
        let mut state = self.record(Call::SwapOff {
            path: path.to_path_buf(),
        })?;
        if !state.active_swaps.remove(path) {
            return Err(tool_failure(
                "swapoff",
                &format!("{}: swapoff failed: Invalid argument", path.display()),
            ));
        }
        Ok(())
    }

    async fn map_swapfile(&self, path: &Path) -> Result<String> {
        let state = self.record(Call::MapSwapfile {
            path: path.to_path_buf(),
        })?;
        state
            .map_swapfile_output
            .clone()
            .ok_or_else(|| tool_failure("btrfs inspect-internal map-swapfile", "unknown command"))
    }

    async fn extent_map(&self, path: &Path) -> Result<String> {
        let state = self.record(Call::ExtentMap {
            path: path.to_path_buf(),
        })?;
        state
            .extent_map_output
            .clone()
            .ok_or_else(|| tool_failure("filefrag", "FIEMAP failed"))
    }

    async fn memory_total_mib(&self) -> Result<u64> {
        let state = self.record(Call::MemoryTotal)?;
        Ok(state.memory_mib)
    }
}

#[async_trait]
impl HostOps for FakeDeviceOps {
    fn node_exists(&self, path: &Path) -> bool {
        let mut state = self.state();
        if state.nodes.contains(path) {
            return true;
        }
        let Some(remaining) = state.pending.get_mut(path) else {
            return false;
        };
        *remaining = remaining.saturating_sub(1);
        if *remaining > 0 {
            return false;
        }
        state.pending.remove(path);
        state.nodes.insert(path.to_path_buf());
        true
    }

    async fn install_base_system(
        &self,
        root: &Path,
        repo: &str,
        arch: &str,
        packages: &[String],
    ) -> Result<()> {
        self.record(Call::InstallBaseSystem {
            root: root.to_path_buf(),
            repo: repo.to_string(),
            arch: arch.to_string(),
            packages: packages.to_vec(),
        })?;
        Ok(())
    }

    async fn run_in_root(
        &self,
        root: &Path,
        program: &str,
        environment: &[(String, String)],
    ) -> Result<()> {
        self.record(Call::RunInRoot {
            root: root.to_path_buf(),
            program: program.to_string(),
            environment: environment.to_vec(),
        })?;
        Ok(())
    }

    async fn reconfigure(&self, args: &[&str]) -> Result<()> {
        self.record(Call::Reconfigure {
            args: args.iter().map(ToString::to_string).collect(),
        })?;
        Ok(())
    }

    async fn install_bootloader(&self, efi_directory: &Path, bootloader_id: &str) -> Result<()> {
        self.record(Call::InstallBootloader {
            efi_directory: efi_directory.to_path_buf(),
            bootloader_id: bootloader_id.to_string(),
        })?;
        Ok(())
    }

    async fn write_boot_menu(&self, output: &Path) -> Result<()> {
        self.record(Call::WriteBootMenu {
            output: output.to_path_buf(),
        })?;
        Ok(())
    }

    async fn reboot(&self) -> Result<()> {
        self.record(Call::Reboot)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn partition_nodes_appear_after_table_write() {
        let fake = FakeDeviceOps::new().with_node_delay("/dev/nvme0n1p3", 2);
        assert!(!fake.node_exists(Path::new("/dev/nvme0n1p1")));

        fake.write_partition_table("/dev/nvme0n1", &[]).await.unwrap();

        assert!(fake.node_exists(Path::new("/dev/nvme0n1p1")));
        assert!(!fake.node_exists(Path::new("/dev/nvme0n1p3")));
        assert!(fake.node_exists(Path::new("/dev/nvme0n1p3")));
    }

    #[tokio::test]
    async fn filesystem_uuid_follows_mounted_device() {
        let fake = FakeDeviceOps::new().with_device_uuid("/dev/sda1", "AAAA-BBBB");
        fake.make_filesystem("/dev/sda1", FilesystemKind::Vfat, "EFI")
            .await
            .unwrap();
        // a fresh filesystem drops any scripted uuid
        let fake = fake.with_device_uuid("/dev/sda1", "AAAA-BBBB");
        fake.mount("/dev/sda1", Path::new("/mnt/efi"), None)
            .await
            .unwrap();

        let uuid = fake.filesystem_uuid(Path::new("/mnt/efi")).await.unwrap();
        assert_eq!(uuid, "AAAA-BBBB");
        assert_eq!(fake.mounts_snapshot()[0].fs_type, "vfat");
        assert!(fake.filesystem_uuid(Path::new("/mnt/boot")).await.is_err());
    }

    #[tokio::test]
    async fn injected_failure_is_recorded_then_returned() {
        let fake = FakeDeviceOps::new().fail_on("luks_format", "Device /dev/sda3 is in use.");
        let error = fake.luks_format("/dev/sda3", 512).await.unwrap_err();

        assert!(error.to_string().contains("is in use"));
        assert_eq!(fake.ledger().count("luks_format"), 1);
    }

    #[tokio::test]
    async fn targeted_mount_failure_leaves_other_mounts_alone() {
        let fake = FakeDeviceOps::new().fail_mount_at("/mnt/home", "special device busy");

        fake.mount("/dev/mapper/cryptroot", Path::new("/mnt"), None)
            .await
            .unwrap();
        let error = fake
            .mount("/dev/mapper/cryptroot", Path::new("/mnt/home"), None)
            .await
            .unwrap_err();

        assert!(error.to_string().contains("special device busy"));
        assert_eq!(fake.ledger().count("mount"), 2);
        assert_eq!(fake.mounts_snapshot().len(), 1);
    }

    #[tokio::test]
    async fn recursive_unmount_clears_nested_mounts() {
        let fake = FakeDeviceOps::new();
        fake.mount("/dev/mapper/cryptroot", Path::new("/mnt"), Some("subvol=@"))
            .await
            .unwrap();
        fake.bind_rslave(Path::new("/dev"), Path::new("/mnt/dev"))
            .await
            .unwrap();

        fake.unmount_recursive(Path::new("/mnt")).await.unwrap();
        assert!(fake.mounts_snapshot().is_empty());
        assert!(fake.unmount_recursive(Path::new("/mnt")).await.is_err());
    }
}
