// SPDX-License-Identifier: GPL-3.0-only

use std::process::{Output, Stdio};

use install_contracts::{InstallError, Result};
use tokio::process::Command;
use tracing::debug;

pub fn render<S: AsRef<str>>(command: &str, args: &[S]) -> String {
    if args.is_empty() {
        command.to_string()
    } else {
        let args: Vec<&str> = args.iter().map(|arg| arg.as_ref()).collect();
        format!("{} {}", command, args.join(" "))
    }
}

/// Run a tool with captured output and return its stdout.
pub async fn run<S: AsRef<str>>(command: &str, args: &[S]) -> Result<String> {
    let rendered = render(command, args);
    debug!(command = %rendered, "running");

    let output = Command::new(command)
        .args(args.iter().map(|arg| AsRef::<str>::as_ref(arg)))
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|error| not_started(&rendered, error))?;

    check(rendered, output)
}

/// Run a tool attached to the controlling terminal.
///
/// Used for passphrase prompts and long package transactions the operator
/// should watch. Nothing is captured, so failures carry no stderr.
pub async fn run_attached<S: AsRef<str>>(
    command: &str,
    args: &[S],
    envs: &[(&str, &str)],
) -> Result<()> {
    let rendered = render(command, args);
    debug!(command = %rendered, "running attached");

    let status = Command::new(command)
        .args(args.iter().map(|arg| AsRef::<str>::as_ref(arg)))
        .envs(envs.iter().copied())
        .status()
        .await
        .map_err(|error| not_started(&rendered, error))?;

    if !status.success() {
        return Err(InstallError::ExternalTool {
            command: rendered,
            status: status.to_string(),
            stderr: "see terminal output".to_string(),
        });
    }

    Ok(())
}

fn check(rendered: String, output: Output) -> Result<String> {
    if !output.status.success() {
        return Err(InstallError::ExternalTool {
            command: rendered,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn not_started(rendered: &str, error: std::io::Error) -> InstallError {
    InstallError::ExternalTool {
        command: rendered.to_string(),
        status: "not started".to_string(),
        stderr: error.to_string(),
    }
}
