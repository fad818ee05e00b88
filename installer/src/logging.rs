// SPDX-License-Identifier: GPL-3.0-only

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

pub const STAGE_ONE_LOG: &str = "crypt-install.log";
pub const STAGE_TWO_LOG: &str = "crypt-install-stage2.log";

const DEFAULT_LOG_DIR: &str = "/var/log/crypt-install";

fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "installer=debug,install_sys=debug,warn"
    } else {
        "installer=info,install_sys=info,warn"
    }
}

/// Install the stderr layer and, when possible, a plain-text file layer.
///
/// `RUST_LOG` overrides the default filter.
pub fn init(log_name: &str, verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    match file_writer(log_name) {
        Ok((writer, guard)) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();

            // Keep the background logging worker alive for the duration of the process.
            let _ = LOG_GUARD.set(guard);
        }
        Err(e) => {
            eprintln!("crypt-install: failed to initialize file logging: {e:#}");
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .init();
        }
    }
}

fn file_writer(
    log_name: &str,
) -> anyhow::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let (dir, file_name) = resolve_log_location(log_name);

    if let Err(e) = fs::create_dir_all(&dir) {
        return Err(anyhow::anyhow!(
            "create log directory failed: {} ({})",
            dir.display(),
            e
        ));
    }

    let appender = tracing_appender::rolling::never(&dir, &file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    Ok((writer, guard))
}

fn resolve_log_location(log_name: &str) -> (PathBuf, OsString) {
    if let Some(file) = std::env::var_os("CRYPT_INSTALL_LOG_FILE") {
        let path = PathBuf::from(file);
        let dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));
        let name = path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from(log_name));
        return (dir, name);
    }

    if let Some(dir) = std::env::var_os("CRYPT_INSTALL_LOG_DIR") {
        return (PathBuf::from(dir), OsString::from(log_name));
    }

    (PathBuf::from(DEFAULT_LOG_DIR), OsString::from(log_name))
}
