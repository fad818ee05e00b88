// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

use crate::Result;

/// LUKS2 container lifecycle.
///
/// `luks_format` and `luks_open` prompt for a passphrase on the controlling
/// terminal. Callers must not retry them.
#[async_trait]
pub trait LuksOps: Send + Sync {
    async fn luks_format(&self, partition: &str, key_size: u32) -> Result<()>;

    async fn luks_open(&self, partition: &str, name: &str) -> Result<()>;

    async fn luks_close(&self, name: &str) -> Result<()>;

    /// UUID of the container backing the open mapping `name`.
    async fn luks_uuid(&self, name: &str) -> Result<String>;
}
