// SPDX-License-Identifier: GPL-3.0-only

//! Parsers for tool and kernel output.

const MIB: u64 = 1024 * 1024;

/// `MemTotal` from `/proc/meminfo`, rounded up to whole MiB.
pub fn parse_meminfo_total_mib(meminfo: &str) -> Option<u64> {
    let line = meminfo.lines().find(|line| line.starts_with("MemTotal:"))?;
    let mut fields = line["MemTotal:".len()..].split_whitespace();
    let kib: u64 = fields.next()?.parse().ok()?;
    Some(kib.div_ceil(1024))
}

/// Backing device from `cryptsetup status <name>`.
pub fn parse_cryptsetup_status_device(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("device:"))
        .map(str::trim)
        .filter(|device| !device.is_empty())
        .map(ToString::to_string)
}

/// `blockdev --getsize64` prints bytes; round down to MiB.
pub fn parse_device_size_mib(output: &str) -> Option<u64> {
    output.trim().parse::<u64>().ok().map(|bytes| bytes / MIB)
}
