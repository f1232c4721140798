use crate::prelude::*;
use crate::{fatal, Result};
use std::process::Stdio;

/// Runs the program to completion and returns its raw output regardless of
/// the exit status. Both stdout and stderr are captured.
///
/// The child process is killed if the returned future is dropped before it
/// completes, so wrapping this in a timeout or a cancellation `select!` is
/// enough to make sure no orphan process survives.
pub(crate) async fn output(program: &str, args: &[&str]) -> std::io::Result<std::process::Output> {
    let display_cmd = display_cmd(program, args);

    debug!(cmd = %display_cmd, "Running program");

    tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
}

/// Same as [`output`], but fails if the program exits with a non-zero status.
pub(crate) async fn run(program: &str, args: &[&str]) -> Result<Vec<u8>> {
    let output = output(program, args).await.fatal_ctx(|| {
        format!(
            "Invocation failed. Command:\n`{}`",
            display_cmd(program, args)
        )
    })?;

    let status = output.status;

    if !status.success() {
        return Err(fatal!(
            "{program} invocation failed with status {status}. Command:\n{}\nStderr:\n{}",
            display_cmd(program, args),
            String::from_utf8_lossy(&output.stderr),
        ));
    }

    Ok(output.stdout)
}

pub(crate) async fn run_utf8(program: &str, args: &[&str]) -> Result<String> {
    let bytes = run(program, args).await?;
    String::from_utf8(bytes).fatal_ctx(|| {
        format!(
            "Bad output (invalid UTF-8).\n\
            Program: {program}.\n\
            Args: {args:?}.\n"
        )
    })
}

fn display_cmd(program: &str, args: &[&str]) -> String {
    // Nul bytes can't be quoted, but we still want to see the command in logs
    let args = shlex::try_join(args.iter().copied()).unwrap_or_else(|_| format!("{args:?}"));
    format!("{program} {args}")
}

/// Waits for the process whose pid is written in `pid_file` to terminate.
/// Zombies count as terminated, since they only wait to be reaped.
#[cfg(all(test, target_os = "linux"))]
pub(crate) async fn assert_exits_soon(pid_file: &std::path::Path) {
    let pid = std::fs::read_to_string(pid_file).unwrap();
    let pid = pid.trim();

    for _ in 0..100 {
        let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
            return;
        };

        // The state follows the parenthesized command name
        let state = stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.trim_start().chars().next());

        if matches!(state, Some('Z' | 'X')) {
            return;
        }

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    panic!("Process {pid} is still running");
}
