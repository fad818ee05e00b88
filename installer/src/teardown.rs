// SPDX-License-Identifier: GPL-3.0-only

//! Best-effort release of swap, mounts and the encrypted mapping
//!
//! Every step is attempted even when an earlier one fails. Failures are
//! logged and collected, never raised.

use std::fmt;
use std::path::PathBuf;

use install_contracts::DeviceOps;
use tracing::{info, warn};

/// What provisioning got far enough to need undoing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Acquired {
    pub swap_file: Option<PathBuf>,
    pub mount_root: Option<PathBuf>,
    pub mapping: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    pub step: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, step: &'static str, error: impl fmt::Display) {
        warn!(step, %error, "teardown step failed");
        self.failures.push(TeardownFailure {
            step,
            error: error.to_string(),
        });
    }
}

impl fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, failure) in self.failures.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", failure.step, failure.error)?;
        }
        Ok(())
    }
}

/// Swap off, unmount recursively, close the mapping, in that order.
pub async fn teardown(ops: &dyn DeviceOps, acquired: &Acquired) -> TeardownReport {
    let mut report = TeardownReport::default();

    if let Some(swap_file) = &acquired.swap_file
        && let Err(error) = ops.swap_off(swap_file).await
    {
        report.record("swapoff", error);
    }

    if let Some(root) = &acquired.mount_root
        && let Err(error) = ops.unmount_recursive(root).await
    {
        report.record("unmount", error);
    }

    if let Some(name) = &acquired.mapping
        && let Err(error) = ops.luks_close(name).await
    {
        report.record("close mapping", error);
    }

    if report.is_clean() {
        info!("teardown complete");
    }
    report
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use install_contracts::{FilesystemOps, SwapOps};
    use install_testing::FakeDeviceOps;

    use super::*;

    fn everything() -> Acquired {
        Acquired {
            swap_file: Some(PathBuf::from("/mnt/swap/swapfile")),
            mount_root: Some(PathBuf::from("/mnt")),
            mapping: Some("cryptroot".to_string()),
        }
    }

    #[tokio::test]
    async fn clean_teardown_runs_steps_in_order() {
        let fake = FakeDeviceOps::new().with_node("/dev/mapper/cryptroot");
        fake.mount("/dev/mapper/cryptroot", Path::new("/mnt"), None)
            .await
            .unwrap();
        fake.swap_on(Path::new("/mnt/swap/swapfile")).await.unwrap();

        let report = teardown(&fake, &everything()).await;

        assert!(report.is_clean(), "{report}");
        assert_eq!(
            &fake.ledger().names()[2..],
            &["swap_off", "unmount_recursive", "luks_close"]
        );
        assert!(!fake.is_mapped("cryptroot"));
    }

    #[tokio::test]
    async fn failures_are_collected_and_later_steps_still_run() {
        let fake = FakeDeviceOps::new()
            .with_node("/dev/mapper/cryptroot")
            .fail_on("unmount_recursive", "target is busy");

        let report = teardown(&fake, &everything()).await;

        let steps: Vec<&str> = report.failures.iter().map(|failure| failure.step).collect();
        assert_eq!(steps, vec!["swapoff", "unmount"]);
        assert!(report.to_string().contains("target is busy"));
        assert_eq!(fake.ledger().count("luks_close"), 1);
    }

    #[tokio::test]
    async fn nothing_acquired_means_nothing_attempted() {
        let fake = FakeDeviceOps::new();
        let report = teardown(&fake, &Acquired::default()).await;
        assert!(report.is_clean());
        assert!(fake.ledger().calls.is_empty());
    }
}
