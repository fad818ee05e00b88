// SPDX-License-Identifier: GPL-3.0-only

//! crypt-install: provision an encrypted btrfs root and hand off to stage two

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use install_contracts::InstallErrorKind;
use install_sys::SystemDeviceOps;
use installer::cli::Cli;
use installer::{InstallPlan, Installer, config, handoff, logging, preflight};
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(logging::STAGE_ONE_LOG, cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(installer::exit_code(&e))
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = config::load(&cli).context("loading configuration")?;

    if cli.print_plan {
        let plan = InstallPlan::new(&config)?;
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(ExitCode::SUCCESS);
    }

    info!(
        "Starting crypt-install v{} on {}",
        env!("CARGO_PKG_VERSION"),
        config.disk
    );

    preflight::host_checks(&config).context("preflight")?;

    let ops = SystemDeviceOps::new();
    let mut installer = Installer::new(&ops, &config, handoff::sibling_stage_two()?);
    let layout = installer.preflight().await.context("preflight")?;

    preflight::confirm_destruction(
        &config,
        &layout,
        std::io::stdin().lock(),
        std::io::stderr(),
    )?;

    let report = installer.run(&layout).await?;
    if !report.is_clean() {
        return Ok(ExitCode::from(InstallErrorKind::ExternalTool.exit_code()));
    }
    Ok(ExitCode::SUCCESS)
}
