//! External tool execution with live output forwarding.
//!
//! The helper tools run for minutes at a time, so their stdout and stderr are
//! piped and forwarded to our stderr line-by-line as they arrive rather than
//! dumped at exit. Failure is determined by the exit code alone; output
//! content never fails a run. The call is synchronous — it returns only after
//! the child exits.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

use crate::error::{Error, Result};

/// Run a tool to completion, forwarding its output as it arrives.
///
/// `label` prefixes forwarded lines and names the tool in errors. Returns an
/// error carrying the exit code and captured stderr when the tool exits
/// non-zero.
pub fn run_tool(label: &str, program: &Path, args: &[String]) -> Result<()> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_missing(label, program.to_string_lossy())
            } else {
                Error::internal_io(e.to_string(), Some(format!("spawn {}", label)))
            }
        })?;

    // Piped in spawn(), so take() cannot return None here.
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let out_handle = spawn_forwarder(label, stdout, false);
    let err_handle = spawn_forwarder(label, stderr, true);

    let status = child
        .wait()
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("wait for {}", label))))?;

    let _ = out_handle.join();
    let captured = err_handle.join().unwrap_or_default();

    if !status.success() {
        let exit_code = status.code().unwrap_or(1);
        return Err(Error::tool_execution_failed(
            label,
            exit_code,
            captured.join("\n"),
        ));
    }

    Ok(())
}

/// Forward lines from a child stream to our stderr, collecting them when
/// `capture` is set (stderr is retained for error reporting).
fn spawn_forwarder<R: Read + Send + 'static>(
    label: &str,
    stream: Option<R>,
    capture: bool,
) -> thread::JoinHandle<Vec<String>> {
    let label = label.to_string();
    thread::spawn(move || {
        let mut captured = Vec::new();
        let Some(stream) = stream else {
            return captured;
        };
        let reader = BufReader::new(stream);
        // lines() errors on invalid UTF-8; a bad line is dropped rather than
        // aborting the stream.
        for line in reader.lines().filter_map(|l| l.ok()) {
            eprintln!("[{}] {}", label, line);
            if capture {
                captured.push(line);
            }
        }
        captured
    })
}
