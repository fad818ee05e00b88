// SPDX-License-Identifier: GPL-3.0-only

/// Marker identifying NVMe namespaces, whose partitions take a `p` separator.
const NVME_MARKER: &str = "nvme";

/// Device path of partition `index` on `parent`.
///
/// `/dev/nvme0n1` + 2 gives `/dev/nvme0n1p2`; `/dev/sda` + 2 gives `/dev/sda2`.
pub fn partition_path(parent: &str, index: u32) -> String {
    if parent.contains(NVME_MARKER) {
        format!("{parent}p{index}")
    } else {
        format!("{parent}{index}")
    }
}

/// Whether `source` names `disk` itself or one of its partitions.
///
/// Follows kernel naming rather than [`partition_path`]: a disk whose name
/// ends in a digit (`nvme0n1`, `mmcblk0`, `loop0`) takes a `p` separator.
pub fn is_disk_or_partition(disk: &str, source: &str) -> bool {
    let Some(rest) = source.strip_prefix(disk) else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }

    let digits = if disk.ends_with(|character: char| character.is_ascii_digit()) {
        match rest.strip_prefix('p') {
            Some(digits) => digits,
            None => return false,
        }
    } else {
        rest
    };

    !digits.is_empty() && digits.chars().all(|character| character.is_ascii_digit())
}

/// Path of the mapped block device for an open encrypted volume.
pub fn mapper_path(name: &str) -> String {
    format!("/dev/mapper/{name}")
}
