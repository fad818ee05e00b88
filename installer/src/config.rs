// SPDX-License-Identifier: GPL-3.0-only

//! Configuration loading
//!
//! Defaults, then an optional TOML file, then command-line flags. The result
//! is an immutable [`InstallConfig`].

use std::fs;
use std::path::{Path, PathBuf};

use install_contracts::{InstallError, Result};
use install_types::{
    DEFAULT_ARCH, DEFAULT_BOOT_SIZE, DEFAULT_EFI_SIZE, DEFAULT_HOSTNAME, DEFAULT_KEY_SIZE,
    DEFAULT_MOUNT_OPTIONS, DEFAULT_REPO, DEFAULT_TARGET_ROOT, DEFAULT_VOLUME_NAME,
    FilesystemLabels, InstallConfig, PollSettings, SizeSpec,
};
use serde::Deserialize;

use crate::cli::Cli;

/// Every field of [`InstallConfig`], all optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub disk: Option<String>,
    pub efi_size: Option<SizeSpec>,
    pub boot_size: Option<SizeSpec>,
    pub hostname: Option<String>,
    pub arch: Option<String>,
    pub repo: Option<String>,
    pub musl: Option<bool>,
    pub force: Option<bool>,
    pub target_root: Option<PathBuf>,
    pub scratch_mount: Option<PathBuf>,
    pub volume_name: Option<String>,
    pub key_size: Option<u32>,
    pub mount_options: Option<String>,
    pub packages: Vec<String>,
    pub reboot: Option<bool>,
    pub labels: Option<FilesystemLabels>,
    pub poll: Option<PollSettings>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|error| {
            InstallError::precondition(format!("cannot read {}: {error}", path.display()))
        })?;
        Self::parse(&raw, path)
    }

    fn parse(raw: &str, path: &Path) -> Result<Self> {
        toml::from_str(raw).map_err(|error| {
            InstallError::precondition(format!("invalid config {}: {error}", path.display()))
        })
    }
}

/// Resolve the configuration for this run.
pub fn load(cli: &Cli) -> Result<InstallConfig> {
    let file = match &cli.config {
        Some(path) => FileConfig::read(path)?,
        None => FileConfig::default(),
    };
    merge(cli, file)
}

fn parse_size(flag: Option<&String>) -> Result<Option<SizeSpec>> {
    flag.map(|value| value.parse::<SizeSpec>())
        .transpose()
        .map_err(InstallError::from)
}

pub fn merge(cli: &Cli, file: FileConfig) -> Result<InstallConfig> {
    let disk = cli
        .disk
        .clone()
        .or(file.disk)
        .ok_or_else(|| InstallError::precondition("--disk is required"))?;

    let target_root = cli
        .target_root
        .clone()
        .or(file.target_root)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TARGET_ROOT));
    let scratch_mount = file.scratch_mount.unwrap_or_else(|| target_root.clone());

    let mut packages = file.packages;
    packages.extend(cli.packages.iter().cloned());

    Ok(InstallConfig {
        disk,
        efi_size: parse_size(cli.efi_size.as_ref())?
            .or(file.efi_size)
            .unwrap_or(DEFAULT_EFI_SIZE),
        boot_size: parse_size(cli.boot_size.as_ref())?
            .or(file.boot_size)
            .unwrap_or(DEFAULT_BOOT_SIZE),
        hostname: cli
            .hostname
            .clone()
            .or(file.hostname)
            .unwrap_or_else(|| DEFAULT_HOSTNAME.to_string()),
        arch: cli
            .arch
            .clone()
            .or(file.arch)
            .unwrap_or_else(|| DEFAULT_ARCH.to_string()),
        repo: cli
            .repo
            .clone()
            .or(file.repo)
            .unwrap_or_else(|| DEFAULT_REPO.to_string()),
        musl: cli.musl.or(file.musl).unwrap_or(false),
        force: cli.force || file.force.unwrap_or(false),
        target_root,
        scratch_mount,
        volume_name: cli
            .volume_name
            .clone()
            .or(file.volume_name)
            .unwrap_or_else(|| DEFAULT_VOLUME_NAME.to_string()),
        key_size: cli.key_size.or(file.key_size).unwrap_or(DEFAULT_KEY_SIZE),
        mount_options: cli
            .mount_options
            .clone()
            .or(file.mount_options)
            .unwrap_or_else(|| DEFAULT_MOUNT_OPTIONS.to_string()),
        packages,
        reboot: !cli.no_reboot && file.reboot.unwrap_or(true),
        labels: file.labels.unwrap_or_default(),
        poll: file.poll.unwrap_or_default(),
    })
}
