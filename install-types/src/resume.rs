// SPDX-License-Identifier: GPL-3.0-only

//! Hibernation resume parameters
//!
//! The resume offset is the physical block of the swap file's first extent.
//! It is only meaningful once the file is fully allocated and active.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Prefix of the single override line this installer owns in `/etc/default/grub`.
pub const RESUME_OVERRIDE_PREFIX: &str =
    "GRUB_CMDLINE_LINUX_DEFAULT=\"$GRUB_CMDLINE_LINUX_DEFAULT resume=";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{0}' is not a filesystem UUID")]
pub struct InvalidUuid(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapResumeInfo {
    /// UUID of the filesystem holding the swap file.
    pub uuid: String,
    /// Physical offset of the first extent, in filesystem pages.
    pub offset: u64,
}

impl SwapResumeInfo {
    pub fn new(uuid: &str, offset: u64) -> Result<Self, InvalidUuid> {
        let parsed = Uuid::parse_str(uuid.trim()).map_err(|_| InvalidUuid(uuid.to_string()))?;
        Ok(Self {
            uuid: parsed.hyphenated().to_string(),
            offset,
        })
    }

    pub fn kernel_args(&self) -> String {
        format!("resume=UUID={} resume_offset={}", self.uuid, self.offset)
    }

    pub fn override_line(&self) -> String {
        format!(
            "GRUB_CMDLINE_LINUX_DEFAULT=\"$GRUB_CMDLINE_LINUX_DEFAULT {}\"",
            self.kernel_args()
        )
    }
}

/// Drop any previous resume override from `existing` and append the new one.
///
/// With `resume` absent the result carries no override at all. Other lines
/// keep their order.
pub fn apply_resume_override(existing: &str, resume: Option<&SwapResumeInfo>) -> String {
    let mut output: String = existing
        .lines()
        .filter(|line| !line.trim_start().starts_with(RESUME_OVERRIDE_PREFIX))
        .map(|line| format!("{line}\n"))
        .collect();

    if let Some(resume) = resume {
        output.push_str(&resume.override_line());
        output.push('\n');
    }

    output
}

/// Offset printed by `btrfs inspect-internal map-swapfile`.
///
/// Accepts both the bare `-r` form and the labelled `Resume offset:` form.
pub fn parse_map_swapfile(output: &str) -> Option<u64> {
    let line = output.lines().map(str::trim).rfind(|line| !line.is_empty())?;
    let value = match line.split_once(':') {
        Some((label, value)) if label.trim().eq_ignore_ascii_case("resume offset") => value,
        Some(_) => return None,
        None => line,
    };
    value.trim().parse().ok()
}

/// Starting physical block of extent 0 in `filefrag -v` output.
///
/// ```text
///  ext:     logical_offset:        physical_offset: length:   expected: flags:
///    0:        0..   32767:    1067264..   1100031:  32768:
/// ```
pub fn parse_filefrag_first_extent(output: &str) -> Option<u64> {
    output.lines().find_map(|line| {
        let mut fields = line.split(':').map(str::trim);
        if fields.next()? != "0" {
            return None;
        }
        let _logical = fields.next()?;
        let physical = fields.next()?;
        let start = physical.split("..").next()?.trim();
        start.parse().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT_UUID: &str = "0b7e7f0c-3f4e-4a8e-9c51-2f4c9c7a1d11";

    const FILEFRAG: &str = "Filesystem type is: 9123683e\n\
File size of /swap/swapfile is 8589934592 (2097152 blocks of 4096 bytes)\n \
ext:     logical_offset:        physical_offset: length:   expected: flags:\n   \
0:        0..   32767:    1067264..   1100031:  32768:            \n   \
1:    32768..   65535:    1100032..   1132799:  32768:            last,eof\n\
/swap/swapfile: 2 extents found\n";

    #[test]
    fn parses_bare_and_labelled_map_swapfile_output() {
        assert_eq!(parse_map_swapfile("266816\n"), Some(266816));
        assert_eq!(
            parse_map_swapfile("Physical start: 1092878336\nResume offset: 266816\n"),
            Some(266816)
        );
        assert_eq!(parse_map_swapfile("ERROR: not a swapfile\n"), None);
        assert_eq!(parse_map_swapfile(""), None);
    }

    #[test]
    fn parses_first_extent_from_filefrag() {
        assert_eq!(parse_filefrag_first_extent(FILEFRAG), Some(1067264));
        assert_eq!(parse_filefrag_first_extent("/swap/swapfile: 0 extents found\n"), None);
    }

    #[test]
    fn rejects_non_uuid_sources() {
        assert!(SwapResumeInfo::new("ABCD-1234", 1).is_err());
        let info = SwapResumeInfo::new(ROOT_UUID, 42).unwrap();
        assert_eq!(
            info.kernel_args(),
            format!("resume=UUID={ROOT_UUID} resume_offset=42")
        );
    }

    #[test]
    fn replaces_stale_override_instead_of_duplicating() {
        let stale = SwapResumeInfo::new(ROOT_UUID, 1).unwrap();
        let fresh = SwapResumeInfo::new(ROOT_UUID, 266816).unwrap();
        let existing = format!("GRUB_TIMEOUT=5\n{}\nGRUB_DISABLE_OS_PROBER=true\n", stale.override_line());

        let updated = apply_resume_override(&existing, Some(&fresh));
        let directives: Vec<&str> = updated
            .lines()
            .filter(|line| line.starts_with(RESUME_OVERRIDE_PREFIX))
            .collect();

        assert_eq!(directives, vec![fresh.override_line().as_str()]);
        assert!(updated.starts_with("GRUB_TIMEOUT=5\nGRUB_DISABLE_OS_PROBER=true\n"));
        assert_eq!(apply_resume_override(&updated, Some(&fresh)), updated);
    }

    #[test]
    fn missing_offset_removes_override() {
        let stale = SwapResumeInfo::new(ROOT_UUID, 1).unwrap();
        let existing = format!("{}\n", stale.override_line());
        assert_eq!(apply_resume_override(&existing, None), "");
    }
}
