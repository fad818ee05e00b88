// SPDX-License-Identifier: GPL-3.0-only

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use install_types::{HandoffMessage, InstallConfig, PollSettings, SizeSpec};
use tempfile::TempDir;

/// A throwaway target root plus a stand-in second-stage binary.
pub struct Workspace {
    pub dir: TempDir,
    pub root: PathBuf,
    pub stage_two: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("target");
        let stage_two = dir.path().join("crypt-install-stage2");
        std::fs::write(&stage_two, b"#!/bin/sh\n").unwrap();
        Self {
            dir,
            root,
            stage_two,
        }
    }

    pub fn config(&self, disk: &str) -> InstallConfig {
        InstallConfig {
            disk: disk.to_string(),
            efi_size: SizeSpec::mib(200),
            boot_size: SizeSpec::mib(500),
            hostname: "voidbox".to_string(),
            arch: "x86_64".to_string(),
            repo: "https://repo-default.voidlinux.org".to_string(),
            musl: false,
            force: true,
            target_root: self.root.clone(),
            scratch_mount: self.root.clone(),
            volume_name: "cryptroot".to_string(),
            key_size: 512,
            mount_options: "rw,noatime,compress=zstd".to_string(),
            packages: Vec::new(),
            reboot: true,
            labels: Default::default(),
            poll: fast_poll(),
        }
    }

    pub fn swap_file(&self) -> PathBuf {
        self.root.join("swap/swapfile")
    }
}

pub fn fast_poll() -> PollSettings {
    PollSettings {
        interval_ms: 1,
        attempts: 5,
    }
}

pub fn message(root_disk: &str) -> HandoffMessage {
    HandoffMessage {
        hostname: "voidbox".to_string(),
        mount_options: "rw,noatime".to_string(),
        esp_device: format!("{root_disk}1"),
        boot_device: format!("{root_disk}2"),
        volume_name: "cryptroot".to_string(),
    }
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}
