use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::foundation::error::{Error, Result};

/// Default wall-clock budget for one external encoder invocation.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Poll interval while waiting on a child process.
const WAIT_POLL: Duration = Duration::from_millis(25);

/// Run an external command to completion, capturing stdout/stderr.
///
/// The call blocks up to `timeout_secs`; on expiry the child is killed and
/// `Error::ProcessTimeout` is returned. Non-zero exit maps to `Error::Encode`
/// carrying the trimmed stderr diagnostic. Encode failures are deterministic
/// for a given input, so no retry happens here.
pub fn run_captured(mut cmd: Command, timeout_secs: u64) -> Result<Vec<u8>> {
    let program = cmd.get_program().to_string_lossy().to_string();
    debug!(command = %program, "spawning external process");

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let child = cmd.spawn().map_err(|e| {
        Error::encode(format!(
            "failed to spawn '{program}' (is it installed and on PATH?): {e}"
        ))
    })?;

    let deadline = Instant::now() + Duration::from_secs(timeout_secs);
    let output = wait_output_with_deadline(child, &program, timeout_secs, deadline)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::encode(format!(
            "'{program}' exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(output.stdout)
}

struct CapturedOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

fn wait_output_with_deadline(
    mut child: Child,
    program: &str,
    timeout_secs: u64,
    deadline: Instant,
) -> Result<CapturedOutput> {
    // Drain both pipes on threads so a chatty child cannot deadlock against
    // a full pipe buffer while we poll for exit.
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out_handle = std::thread::spawn(move || read_all(stdout));
    let err_handle = std::thread::spawn(move || read_all(stderr));

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::ProcessTimeout {
                        command: program.to_string(),
                        timeout_secs,
                    });
                }
                std::thread::sleep(WAIT_POLL);
            }
            Err(e) => {
                return Err(Error::encode(format!(
                    "failed waiting for '{program}': {e}"
                )));
            }
        }
    };

    let stdout = out_handle
        .join()
        .map_err(|_| Error::encode("stdout drain thread panicked"))?;
    let stderr = err_handle
        .join()
        .map_err(|_| Error::encode("stderr drain thread panicked"))?;

    Ok(CapturedOutput {
        status,
        stdout,
        stderr,
    })
}

fn read_all(pipe: Option<impl std::io::Read>) -> Vec<u8> {
    use std::io::Read as _;
    let mut buf = Vec::new();
    if let Some(mut p) = pipe {
        let _ = p.read_to_end(&mut buf);
    }
    buf
}

/// Wait for an already-spawned child within a deadline, killing it on expiry.
///
/// Used by streaming encoders after their stdin is closed.
pub(crate) fn wait_with_deadline(
    child: &mut Child,
    program: &str,
    timeout_secs: u64,
) -> Result<ExitStatus> {
    let deadline = Instant::now() + Duration::from_secs(timeout_secs);
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::ProcessTimeout {
                        command: program.to_string(),
                        timeout_secs,
                    });
                }
                std::thread::sleep(WAIT_POLL);
            }
            Err(e) => {
                return Err(Error::encode(format!(
                    "failed waiting for '{program}': {e}"
                )));
            }
        }
    }
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Return `true` when `ffprobe` can be invoked from `PATH`.
pub fn is_ffprobe_on_path() -> bool {
    Command::new("ffprobe")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Move a finished artifact into its final destination.
///
/// Work products are staged inside the job directory and renamed into place
/// only on full success, so a failed run never leaves a partial file at the
/// destination. Falls back to copy+remove when the rename crosses devices.
pub fn move_into_place(staged: &Path, dest: &Path) -> Result<()> {
    use anyhow::Context as _;
    ensure_parent_dir(dest)?;
    match std::fs::rename(staged, dest) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(staged, dest)
                .with_context(|| format!("failed to move output into '{}'", dest.display()))?;
            let _ = std::fs::remove_file(staged);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_of_successful_command() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf hello"]);
        let out = run_captured(cmd, 10).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn nonzero_exit_maps_to_encode_error_with_stderr() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo boom >&2; exit 3"]);
        let err = run_captured(cmd, 10).unwrap_err();
        match err {
            Error::Encode(msg) => assert!(msg.contains("boom"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn timeout_kills_and_reports() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let started = Instant::now();
        let err = run_captured(cmd, 1).unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(matches!(err, Error::ProcessTimeout { .. }));
    }

    #[test]
    fn missing_binary_is_an_encode_error() {
        let cmd = Command::new("definitely-not-a-real-binary-name");
        assert!(matches!(run_captured(cmd, 5), Err(Error::Encode(_))));
    }
}
