//! External command execution.
//!
//! Renderer capabilities are external programs: the request is piped to
//! stdin as JSON and stdout carries the result. Failures keep stderr so the
//! page error shows what the renderer printed.

use anyhow::{Context, Result};
use std::{
    ffi::OsString,
    io::Write,
    path::Path,
    process::{Command, Output, Stdio},
};

/// Run `cmd` (program + leading args) in `root`, feed `input` on stdin and
/// return stdout.
///
/// # Errors
/// Returns error if the command cannot be spawned or exits non-zero.
pub fn run_with_stdin(root: Option<&Path>, cmd: &[String], input: &[u8]) -> Result<Vec<u8>> {
    let (name, mut command) = prepare(root, cmd)?;

    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("Failed to spawn `{name}`"))?;

    let mut stdin = child.stdin.take().context("Failed to acquire stdin")?;

    // stdin is fed from its own thread while stdout drains, so a child that
    // writes before reading all of its input cannot fill both pipes
    let (written, output) = std::thread::scope(|s| {
        let writer = s.spawn(move || stdin.write_all(input));
        let output = child.wait_with_output();
        (writer.join(), output)
    });

    let output = output.with_context(|| format!("{name} process failed"))?;
    match written {
        Ok(Ok(())) => {}
        // A child may exit without reading everything; its status decides
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
        Ok(Err(e)) => {
            return Err(e).with_context(|| format!("Failed to write request to `{name}`"));
        }
        Err(_) => anyhow::bail!("stdin writer for `{name}` panicked"),
    }

    if !output.status.success() {
        anyhow::bail!(format_error(&name, &output));
    }

    Ok(output.stdout)
}

/// Prepare a Command from components.
fn prepare(root: Option<&Path>, cmd: &[String]) -> Result<(String, Command)> {
    let name = cmd.first().context("Empty command")?.clone();

    let mut command = Command::new(&name);
    command.args(cmd[1..].iter().map(OsString::from));

    if let Some(dir) = root {
        command.current_dir(dir);
    }

    Ok((name, command))
}

/// Build an error message from a failed command's output.
fn format_error(name: &str, output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    match (output.status.code(), stderr.is_empty()) {
        (Some(code), true) => format!("`{name}` exited with code {code}"),
        (Some(code), false) => format!("`{name}` exited with code {code}:\n{stderr}"),
        (None, true) => format!("`{name}` was terminated by a signal"),
        (None, false) => format!("`{name}` was terminated by a signal:\n{stderr}"),
    }
}
