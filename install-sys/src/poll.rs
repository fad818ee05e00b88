// SPDX-License-Identifier: GPL-3.0-only

use install_contracts::{InstallError, Result};
use install_types::PollSettings;
use tracing::debug;

/// Poll `ready` until it reports true or the attempt budget runs out.
///
/// The predicate is checked before the first sleep, so an already present
/// node costs nothing.
pub async fn poll_until<F>(what: &str, settings: PollSettings, mut ready: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let attempts = settings.attempts.max(1);

    for attempt in 1..=attempts {
        if ready() {
            debug!(what, attempt, "ready");
            return Ok(());
        }
        if attempt < attempts {
            tokio::time::sleep(settings.interval()).await;
        }
    }

    Err(InstallError::DeviceTimeout {
        what: what.to_string(),
        waited: settings.interval() * (attempts - 1),
    })
}
