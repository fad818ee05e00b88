// SPDX-License-Identifier: GPL-3.0-only

//! crypt-install-stage2: finalize the installed system from inside its root
//!
//! Reads its configuration from exactly the environment stage one passes in.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use install_contracts::InstallError;
use install_sys::{STAGE_TWO_TOOLS, SystemDeviceOps};
use install_types::HandoffMessage;
use installer::{Configurator, logging, preflight};
use tracing::{error, info};

/// Second-stage configurator; run by crypt-install inside the new root
#[derive(Parser)]
#[command(name = "crypt-install-stage2", long_about = None)]
struct Cli {
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(logging::STAGE_TWO_LOG, cli.verbose);

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(installer::exit_code(&e))
        }
    }
}

async fn run() -> Result<()> {
    let message = HandoffMessage::from_vars(std::env::vars())
        .map_err(InstallError::from)
        .context("reading handoff")?;
    preflight::require_tools(STAGE_TWO_TOOLS)?;

    info!(hostname = %message.hostname, "stage two starting");
    let ops = SystemDeviceOps::new();
    Configurator::new(&ops, "/", message).run().await?;
    Ok(())
}
