//! Process runner - executes the calculation command under a deadline
//!
//! The command runs through the platform shell inside the job's working
//! directory. Its stdout and stderr are captured and mirrored to the agent's
//! own streams as they arrive. On unix the shell leads its own process group,
//! so a deadline kill also takes down everything the command started. A
//! failing or timed-out command is not an error
//! here: the failure is appended to the captured stderr so it reaches the
//! coordinator with the rest of the result.

use patchwork_core::Result;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::tee::{SharedBuffer, Tee};

/// Line appended to stderr when the deadline kills the command
pub const TIMEOUT_MESSAGE: &str = "Command timed out";

/// How long to keep draining both pipes once the command has exited or been
/// killed. Detached grandchildren that inherited the pipes can keep them open
/// indefinitely.
const CAPTURE_GRACE: Duration = Duration::from_secs(5);

/// Captured output of one command run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ProcessOutput {
    /// Both streams, stdout first
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Remove one pair of enclosing double quotes
pub fn strip_enclosing_quotes(command: &str) -> &str {
    command
        .strip_prefix('"')
        .and_then(|c| c.strip_suffix('"'))
        .unwrap_or(command)
}

/// Build the platform shell invocation for a command line
pub fn shell_command(command: &str) -> Command {
    let line = strip_enclosing_quotes(command);
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/c").arg(line);
        cmd
    } else {
        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(line);
        cmd
    }
}

/// Run `command` in `work_dir`, killing it once `timeout` has elapsed
pub async fn run(command: &str, work_dir: &Path, timeout: Duration) -> Result<ProcessOutput> {
    let mut cmd = shell_command(command);
    cmd.current_dir(work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    debug!("Spawning {:?} in {}", command, work_dir.display());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!("Failed to start command: {}", e);
            return Ok(ProcessOutput {
                stderr: e.to_string(),
                ..ProcessOutput::default()
            });
        }
    };

    let stdout_buf = SharedBuffer::default();
    let stderr_buf = SharedBuffer::default();

    let stdout_task = child
        .stdout
        .take()
        .map(|out| tokio::spawn(pump(out, Tee::new(stdout_buf.clone(), std::io::stdout()))));
    let stderr_task = child
        .stderr
        .take()
        .map(|err| tokio::spawn(pump(err, Tee::new(stderr_buf.clone(), std::io::stderr()))));

    let started = Instant::now();
    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "Command exceeded its deadline; killing"
            );
            kill_command(&mut child).await;
            child.wait().await
        }
    };
    let timed_out = started.elapsed() >= timeout;

    let capture_deadline = tokio::time::Instant::now() + CAPTURE_GRACE;
    for task in [stdout_task, stderr_task].into_iter().flatten() {
        finish_capture(task, capture_deadline).await;
    }

    let mut stderr = stderr_buf.to_string_lossy();
    match status {
        Ok(status) if !status.success() => append_line(&mut stderr, &status.to_string()),
        Ok(status) => debug!("Command finished with {}", status),
        Err(e) => append_line(&mut stderr, &e.to_string()),
    }
    if timed_out {
        append_line(&mut stderr, TIMEOUT_MESSAGE);
    }

    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        timed_out, "Command complete"
    );

    Ok(ProcessOutput {
        stdout: stdout_buf.to_string_lossy(),
        stderr,
        timed_out,
    })
}

/// Copy a child pipe into a writer until EOF
async fn pump<R, W>(mut reader: R, mut sink: W) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: Write,
{
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        sink.write_all(&buf[..n])?;
        sink.flush()?;
    }
}

/// Kill the command and everything in its process group
async fn kill_command(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: killpg only sends a signal; the group id is our child's pid.
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if rc == 0 {
            return;
        }
        warn!(
            "Failed to kill process group {}: {}",
            pid,
            std::io::Error::last_os_error()
        );
    }

    if let Err(e) = child.kill().await {
        warn!("Failed to kill timed-out command: {}", e);
    }
}

/// Wait for a pump task, giving up at `deadline`
async fn finish_capture(
    mut task: JoinHandle<std::io::Result<()>>,
    deadline: tokio::time::Instant,
) {
    match tokio::time::timeout_at(deadline, &mut task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!("Output capture failed: {}", e),
        Ok(Err(e)) => warn!("Output capture task panicked: {}", e),
        Err(_) => {
            warn!("Output pipe still open after command ended; keeping partial output");
            task.abort();
        }
    }
}

/// Append `line` to `text` on a line of its own
fn append_line(text: &mut String, line: &str) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(line);
    text.push('\n');
}
