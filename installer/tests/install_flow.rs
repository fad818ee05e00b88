// SPDX-License-Identifier: GPL-3.0-only

//! Stage one end to end against the in-memory device operations.

mod common;

use std::path::PathBuf;

use install_contracts::InstallErrorKind;
use install_testing::{Call, FakeDeviceOps};
use installer::{InstallPlan, Installer};
use installer::handoff::STAGE_TWO_PROGRAM;

use common::Workspace;

#[tokio::test]
async fn full_run_provisions_hands_off_and_releases_in_order() {
    let workspace = Workspace::new();
    let config = workspace.config("/dev/sda");
    // Stage two leaves the swap file active behind it.
    let fake = FakeDeviceOps::new().with_active_swap(workspace.swap_file());

    let mut installer = Installer::new(&fake, &config, workspace.stage_two.clone());
    let layout = installer.preflight().await.unwrap();
    let report = installer.run(&layout).await.unwrap();

    assert!(report.is_clean(), "{report}");
    let ledger = fake.ledger();
    for pair in [
        "device_size",
        "write_partition_table",
        "settle",
        "luks_format",
        "luks_open",
        "wipe_signatures",
        "make_filesystem",
        "mount",
        "create_subvolume",
        "install_base_system",
        "bind_rslave",
        "run_in_root",
    ]
    .windows(2)
    {
        ledger.assert_before(pair[0], pair[1]);
    }
    let names = ledger.names();
    assert_eq!(
        &names[names.len() - 5..],
        &["run_in_root", "swap_off", "unmount_recursive", "luks_close", "reboot"]
    );
    assert!(!fake.is_mapped("cryptroot"));
    assert!(fake.mounts_snapshot().is_empty());
    assert!(fake.active_swaps().is_empty());
}

#[tokio::test]
async fn partitions_root_container_and_hands_off_exact_environment() {
    let workspace = Workspace::new();
    let config = workspace.config("/dev/nvme0n1");
    let fake = FakeDeviceOps::new().with_active_swap(workspace.swap_file());

    let mut installer = Installer::new(&fake, &config, workspace.stage_two.clone());
    let layout = installer.preflight().await.unwrap();
    installer.run(&layout).await.unwrap();

    let calls = fake.ledger().calls;
    let script = calls
        .iter()
        .find_map(|call| match call {
            Call::WritePartitionTable { disk, script } => {
                assert_eq!(disk, "/dev/nvme0n1");
                Some(script.clone())
            }
            _ => None,
        })
        .unwrap();
    assert_eq!(&script[..2], &["mklabel", "gpt"]);
    assert_eq!(script.last().map(String::as_str), Some("100%"));

    assert!(calls.contains(&Call::LuksFormat {
        partition: "/dev/nvme0n1p3".to_string(),
        key_size: 512,
    }));

    let (program, environment) = calls
        .iter()
        .find_map(|call| match call {
            Call::RunInRoot {
                program,
                environment,
                ..
            } => Some((program.clone(), environment.clone())),
            _ => None,
        })
        .unwrap();
    assert_eq!(program, STAGE_TWO_PROGRAM);
    assert_eq!(environment, config.handoff_message().environment());

    let staged = workspace
        .root
        .join(STAGE_TWO_PROGRAM.trim_start_matches('/'));
    assert!(staged.is_file());
}

#[tokio::test]
async fn no_reboot_when_disabled() {
    let workspace = Workspace::new();
    let mut config = workspace.config("/dev/sda");
    config.reboot = false;
    let fake = FakeDeviceOps::new().with_active_swap(workspace.swap_file());

    let mut installer = Installer::new(&fake, &config, workspace.stage_two.clone());
    let layout = installer.preflight().await.unwrap();
    let report = installer.run(&layout).await.unwrap();

    assert!(report.is_clean());
    assert_eq!(fake.ledger().count("reboot"), 0);
    assert_eq!(fake.ledger().count("luks_close"), 1);
}

#[tokio::test]
async fn incomplete_teardown_suppresses_reboot() {
    let workspace = Workspace::new();
    let config = workspace.config("/dev/sda");
    let fake = FakeDeviceOps::new()
        .with_active_swap(workspace.swap_file())
        .fail_on("luks_close", "Device cryptroot is still in use.");

    let mut installer = Installer::new(&fake, &config, workspace.stage_two.clone());
    let layout = installer.preflight().await.unwrap();
    let report = installer.run(&layout).await.unwrap();

    assert!(!report.is_clean());
    assert_eq!(report.failures[0].step, "close mapping");
    assert_eq!(fake.ledger().count("reboot"), 0);
}

#[tokio::test]
async fn failed_package_install_tears_down_and_returns_the_error() {
    let workspace = Workspace::new();
    let config = workspace.config("/dev/sda");
    let fake = FakeDeviceOps::new().fail_on("install_base_system", "repository unreachable");

    let mut installer = Installer::new(&fake, &config, workspace.stage_two.clone());
    let layout = installer.preflight().await.unwrap();
    let error = installer.run(&layout).await.unwrap_err();

    assert_eq!(error.kind(), InstallErrorKind::ExternalTool);
    assert!(error.to_string().contains("repository unreachable"));

    let ledger = fake.ledger();
    assert_eq!(ledger.count("run_in_root"), 0);
    // Swap was never set up, so only mounts and the mapping are released.
    assert_eq!(ledger.count("swap_off"), 0);
    let names = ledger.names();
    assert_eq!(
        &names[names.len() - 3..],
        &["install_base_system", "unmount_recursive", "luks_close"]
    );
    assert_eq!(ledger.count("reboot"), 0);
    assert!(!fake.is_mapped("cryptroot"));
}

#[tokio::test]
async fn mapped_device_that_never_appears_times_out_and_closes() {
    let workspace = Workspace::new();
    let config = workspace.config("/dev/sda");
    let fake = FakeDeviceOps::new().with_missing_node("/dev/mapper/cryptroot");

    let mut installer = Installer::new(&fake, &config, workspace.stage_two.clone());
    let layout = installer.preflight().await.unwrap();
    let error = installer.run(&layout).await.unwrap_err();

    assert_eq!(error.kind(), InstallErrorKind::Timeout);
    let ledger = fake.ledger();
    assert_eq!(ledger.count("make_filesystem"), 0);
    assert_eq!(ledger.count("unmount_recursive"), 0);
    // The mapping was opened, so closing it is still attempted.
    assert_eq!(ledger.count("luks_close"), 1);
    assert_eq!(ledger.count("reboot"), 0);
}

#[tokio::test]
async fn rejected_passphrase_stops_before_any_mapping_exists() {
    let workspace = Workspace::new();
    let config = workspace.config("/dev/sda");
    let fake = FakeDeviceOps::new().fail_on("luks_open", "No key available with this passphrase.");

    let mut installer = Installer::new(&fake, &config, workspace.stage_two.clone());
    let layout = installer.preflight().await.unwrap();
    let error = installer.run(&layout).await.unwrap_err();

    assert_eq!(error.kind(), InstallErrorKind::Precondition);
    let ledger = fake.ledger();
    assert_eq!(ledger.count("luks_open"), 1);
    assert_eq!(ledger.count("luks_close"), 0);
    assert_eq!(ledger.count("unmount_recursive"), 0);
}

#[tokio::test]
async fn mounted_partition_blocks_before_anything_destructive() {
    let workspace = Workspace::new();
    let config = workspace.config("/dev/sda");
    let fake = FakeDeviceOps::new().with_mount("/dev/sda2", "/media/usb", "ext4");

    let installer = Installer::new(&fake, &config, workspace.stage_two.clone());
    let error = installer.preflight().await.unwrap_err();

    assert_eq!(error.kind(), InstallErrorKind::Precondition);
    assert!(error.to_string().contains("/media/usb"));
    assert!(fake.ledger().calls.is_empty());
}

#[tokio::test]
async fn similarly_named_disk_does_not_block() {
    let workspace = Workspace::new();
    let config = workspace.config("/dev/sda");
    let fake = FakeDeviceOps::new().with_mount("/dev/sdaa1", "/media/other", "ext4");

    let installer = Installer::new(&fake, &config, workspace.stage_two.clone());
    installer.preflight().await.unwrap();
}

#[tokio::test]
async fn undersized_disk_is_rejected() {
    let workspace = Workspace::new();
    let config = workspace.config("/dev/sda");
    let fake = FakeDeviceOps::new().with_device_size(Some(1500));

    let installer = Installer::new(&fake, &config, workspace.stage_two.clone());
    let error = installer.preflight().await.unwrap_err();

    assert_eq!(error.kind(), InstallErrorKind::Precondition);
    assert_eq!(fake.ledger().count("write_partition_table"), 0);
}

#[tokio::test]
async fn unknown_disk_size_is_left_to_the_partitioner() {
    let workspace = Workspace::new();
    let config = workspace.config("/dev/sda");
    let fake = FakeDeviceOps::new().with_device_size(None);

    let installer = Installer::new(&fake, &config, workspace.stage_two.clone());
    let layout = installer.preflight().await.unwrap();
    assert_eq!(layout.partitions.len(), 3);
    assert!(workspace.root.is_dir());
}

#[tokio::test]
async fn missing_second_stage_binary_is_a_precondition() {
    let workspace = Workspace::new();
    let config = workspace.config("/dev/sda");
    let fake = FakeDeviceOps::new();

    let installer = Installer::new(&fake, &config, workspace.dir.path().join("absent"));
    let error = installer.preflight().await.unwrap_err();

    assert_eq!(error.kind(), InstallErrorKind::Precondition);
    assert!(fake.ledger().calls.is_empty());
}

#[tokio::test]
async fn failure_below_target_root_unmounts_the_target_not_the_scratch_point() {
    let workspace = Workspace::new();
    let mut config = workspace.config("/dev/sda");
    config.scratch_mount = workspace.dir.path().join("scratch");
    let fake = FakeDeviceOps::new().fail_mount_at(workspace.root.join("home"), "mount point busy");

    let mut installer = Installer::new(&fake, &config, workspace.stage_two.clone());
    let layout = installer.preflight().await.unwrap();
    let error = installer.run(&layout).await.unwrap_err();

    assert_eq!(error.kind(), InstallErrorKind::ExternalTool);
    let unmounted: Vec<PathBuf> = fake
        .ledger()
        .calls
        .into_iter()
        .filter_map(|call| match call {
            Call::UnmountRecursive { target } => Some(target),
            _ => None,
        })
        .collect();
    assert_eq!(unmounted, vec![config.scratch_mount.clone(), workspace.root.clone()]);
    assert!(fake.mounts_snapshot().is_empty());
    assert!(!fake.is_mapped("cryptroot"));
}

#[tokio::test]
async fn failed_root_mount_only_closes_the_mapping() {
    let workspace = Workspace::new();
    let mut config = workspace.config("/dev/sda");
    config.scratch_mount = workspace.dir.path().join("scratch");
    let fake = FakeDeviceOps::new().fail_mount_at(workspace.root.clone(), "wrong fs type");

    let mut installer = Installer::new(&fake, &config, workspace.stage_two.clone());
    let layout = installer.preflight().await.unwrap();
    installer.run(&layout).await.unwrap_err();

    let ledger = fake.ledger();
    // Only the scratch release from building the top level.
    assert_eq!(ledger.count("unmount_recursive"), 1);
    assert_eq!(ledger.names().last(), Some(&"luks_close"));
    assert!(!fake.is_mapped("cryptroot"));
}

#[tokio::test]
async fn mounted_loop_partition_blocks_preflight() {
    let workspace = Workspace::new();
    let config = workspace.config("/dev/loop0");
    let fake = FakeDeviceOps::new().with_mount("/dev/loop0p1", "/run/media/image", "vfat");

    let installer = Installer::new(&fake, &config, workspace.stage_two.clone());
    let error = installer.preflight().await.unwrap_err();

    assert_eq!(error.kind(), InstallErrorKind::Precondition);
    assert!(error.to_string().contains("/dev/loop0p1"));
}

#[test]
fn oversized_partition_request_is_a_precondition_even_for_plans() {
    let workspace = Workspace::new();
    let mut config = workspace.config("/dev/sda");
    config.efi_size = "18446744073709551615MiB".parse().unwrap();

    let error = InstallPlan::new(&config).unwrap_err();
    assert_eq!(error.kind(), InstallErrorKind::Precondition);
}
