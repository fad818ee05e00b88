// SPDX-License-Identifier: GPL-3.0-only

use std::io;
use std::path::PathBuf;

use install_contracts::{InstallError, Result};
use install_types::MountRecord;

const MOUNTINFO: &str = "/proc/self/mountinfo";

pub async fn read_mounts() -> Result<Vec<MountRecord>> {
    let mount_info = tokio::fs::read_to_string(MOUNTINFO).await?;
    parse_mountinfo(&mount_info)
}

/// Parse `/proc/self/mountinfo` in kernel order.
pub fn parse_mountinfo(input: &str) -> Result<Vec<MountRecord>> {
    let mut records = Vec::new();

    for line in input.lines().filter(|line| !line.trim().is_empty()) {
        let (left, right) = line.split_once(" - ").ok_or_else(|| invalid_line(line))?;

        let mount_point = left
            .split_whitespace()
            .nth(4)
            .ok_or_else(|| invalid_line(line))?;

        let mut right_fields = right.split_whitespace();
        let fs_type = right_fields.next().ok_or_else(|| invalid_line(line))?;
        let source = right_fields.next().ok_or_else(|| invalid_line(line))?;

        records.push(MountRecord {
            source: unescape_mount_field(source),
            mount_point: PathBuf::from(unescape_mount_field(mount_point)),
            fs_type: fs_type.to_string(),
        });
    }

    Ok(records)
}

fn invalid_line(line: &str) -> InstallError {
    InstallError::Io(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("invalid mountinfo line: {line}"),
    ))
}

/// Undo the kernel's `\ooo` octal escapes, byte-wise so UTF-8 paths survive.
fn unescape_mount_field(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut output = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'\\'
            && index + 3 < bytes.len()
            && bytes[index + 1..index + 4].iter().all(u8::is_ascii_digit)
            && let Ok(num) = u8::from_str_radix(&value[index + 1..index + 4], 8)
        {
            output.push(num);
            index += 4;
            continue;
        }

        output.push(bytes[index]);
        index += 1;
    }

    String::from_utf8_lossy(&output).into_owned()
}
