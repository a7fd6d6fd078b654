//! Delegate tool fallback — apply a color by running an external program.
//!
//! When the direct HID channel is unusable, color requests are handed to a
//! delegate CLI that opens its own device handle. One process per request,
//! bounded argument list, bounded runtime: the spawned child is polled, never
//! waited on unconditionally, so a timeout or shutdown can always reclaim it.

use std::fmt;
use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::color::Color;
use crate::hid::DeviceAddress;

/// Poll interval when waiting for a delegate process to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Grace period between SIGTERM and SIGKILL on unix.
const KILL_GRACE: Duration = Duration::from_millis(500);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

// ── Error type ──

/// Delegate tool errors.
#[derive(Debug)]
pub enum ToolError {
    /// Tool binary not found in PATH.
    Missing(String),
    /// Tool exceeded its deadline and was killed.
    Timeout { tool: String, secs: u64 },
    /// Tool exited non-zero or could not be reaped.
    Failed {
        tool: String,
        status: Option<i32>,
        output: String,
    },
    /// Invocation aborted because shutdown was requested.
    Cancelled,
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::Missing(tool) => write!(f, "{tool} not found in PATH"),
            ToolError::Timeout { tool, secs } => {
                write!(f, "{tool} timed out after {secs}s")
            }
            ToolError::Failed {
                tool,
                status,
                output,
            } => match status {
                Some(code) => write!(f, "{tool} failed (exit code {code}): {output}"),
                None => write!(f, "{tool} failed (terminated by signal): {output}"),
            },
            ToolError::Cancelled => write!(f, "delegate invocation cancelled during shutdown"),
        }
    }
}

impl std::error::Error for ToolError {}

// ── Fallback trait ──

/// A fallback transport that applies a whole color request out of process.
///
/// `running` is the owning sender's liveness flag; implementations must
/// return promptly once it goes false.
pub trait FallbackChannel: Send + Sync {
    fn apply(&self, color: &Color, running: &AtomicBool) -> Result<(), ToolError>;
}

impl<T: FallbackChannel + ?Sized> FallbackChannel for std::sync::Arc<T> {
    fn apply(&self, color: &Color, running: &AtomicBool) -> Result<(), ToolError> {
        (**self).apply(color, running)
    }
}

// ── Process channel ──

/// Fallback channel invoking the configured delegate CLI.
///
/// Named colors get a minimal invocation; hex and hsv expressions carry the
/// full device address and stepping parameters.
pub struct ProcessChannel {
    delegate: String,
    address: DeviceAddress,
    step: u32,
    delay_ms: u64,
    timeout: Duration,
}

impl ProcessChannel {
    pub fn new(
        delegate: String,
        address: DeviceAddress,
        step: u32,
        delay_ms: u64,
        timeout: Duration,
    ) -> Self {
        ProcessChannel {
            delegate,
            address,
            step,
            delay_ms,
            timeout,
        }
    }

    /// Argument vector for one color request, delegate binary first.
    fn build_command(&self, color: &Color) -> Vec<String> {
        match color {
            Color::Named(named) => vec![
                self.delegate.clone(),
                "set".into(),
                named.as_str().into(),
            ],
            _ => vec![
                self.delegate.clone(),
                "set".into(),
                color.to_string(),
                "--vid".into(),
                format!("0x{:04x}", self.address.vendor_id),
                "--pid".into(),
                format!("0x{:04x}", self.address.product_id),
                "--step".into(),
                self.step.to_string(),
                "--delay-ms".into(),
                self.delay_ms.to_string(),
            ],
        }
    }
}

impl FallbackChannel for ProcessChannel {
    fn apply(&self, color: &Color, running: &AtomicBool) -> Result<(), ToolError> {
        let argv = self.build_command(color);
        log::debug!("delegate invocation: {}", argv.join(" "));
        let output = run_argv(&argv, self.timeout, running)?;
        if !output.trim().is_empty() {
            log::debug!("delegate output: {}", output.trim());
        }
        Ok(())
    }
}

/// Run an argument vector to completion with a deadline and a liveness flag.
///
/// Returns combined stdout/stderr on success. The child is polled every
/// [`POLL_INTERVAL`]; it is terminated when the deadline passes or `running`
/// goes false, so the caller is never stuck behind a wedged delegate.
pub(crate) fn run_argv(
    argv: &[String],
    timeout: Duration,
    running: &AtomicBool,
) -> Result<String, ToolError> {
    let tool = argv[0].clone();
    let mut command = Command::new(&tool);
    command
        .args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        command.creation_flags(CREATE_NO_WINDOW);
    }

    let mut child = command.spawn().map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            ToolError::Missing(tool.clone())
        } else {
            ToolError::Failed {
                tool: tool.clone(),
                status: None,
                output: e.to_string(),
            }
        }
    })?;

    // Drain both pipes while polling; a chatty delegate would otherwise
    // fill the pipe buffer and never exit.
    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                terminate(&mut child);
                return Err(ToolError::Failed {
                    tool,
                    status: None,
                    output: e.to_string(),
                });
            }
        }
        if !running.load(Ordering::SeqCst) {
            terminate(&mut child);
            return Err(ToolError::Cancelled);
        }
        if started.elapsed() >= timeout {
            log::warn!("delegate timed out, killing: {tool}");
            terminate(&mut child);
            return Err(ToolError::Timeout {
                tool,
                secs: timeout.as_secs(),
            });
        }
        thread::sleep(POLL_INTERVAL);
    };

    let output = combine_output(
        stdout_reader.join().unwrap_or_default(),
        stderr_reader.join().unwrap_or_default(),
    );
    if status.success() {
        Ok(output)
    } else {
        let output = if output.trim().is_empty() {
            "no diagnostic output".into()
        } else {
            output.trim().to_string()
        };
        Err(ToolError::Failed {
            tool,
            status: status.code(),
            output,
        })
    }
}

/// Terminate and reap a child, politely on unix.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        // SIGTERM first so the delegate can close its device handle cleanly.
        unsafe {
            libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
        }
        let grace = Instant::now();
        while grace.elapsed() < KILL_GRACE {
            if let Ok(Some(_)) = child.try_wait() {
                return;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Read a pipe to EOF on its own thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    })
}

fn combine_output(stdout: String, stderr: String) -> String {
    let mut combined = stdout;
    if !stderr.is_empty() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(&stderr);
    }
    combined
}
