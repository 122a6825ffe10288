// Tokio process launcher
// reason: tokio::process for async child management, nix for graceful signals on unix
use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, info, warn};

use probe_bridge_core::domain::{ExitStatus, LaunchSpec, OutputMode};
use probe_bridge_core::port::{LaunchError, ProbeProcess, ProcessLauncher};

/// Launches the probe server as a real OS process
///
/// Stdin is closed, stdout follows the LaunchSpec output mode and stderr is piped
/// back as the diagnostic stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessLauncher;

impl TokioProcessLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessLauncher for TokioProcessLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ProbeProcess>, LaunchError> {
        let stdout = match spec.stdout() {
            OutputMode::Inherit => Stdio::inherit(),
            OutputMode::Discard => Stdio::null(),
        };

        let mut child = Command::new(spec.executable())
            .args(spec.args())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LaunchError::from_io(spec.executable(), e))?;

        // kill_on_drop reaps the child if this fails
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| LaunchError::SpawnFailed("stderr was not captured".to_string()))?;

        info!(
            pid = ?child.id(),
            executable = %spec.executable(),
            "Probe server spawned"
        );

        Ok(Box::new(TokioProbeProcess {
            child,
            stderr: Some(BufReader::new(stderr)),
            pending: Vec::new(),
        }))
    }
}

/// Spawned probe server with its captured stderr
pub struct TokioProbeProcess {
    child: Child,
    stderr: Option<BufReader<ChildStderr>>,
    /// Bytes of the line being read; kept across cancelled reads
    pending: Vec<u8>,
}

#[async_trait]
impl ProbeProcess for TokioProbeProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn next_line(&mut self) -> io::Result<Option<String>> {
        let Some(stderr) = self.stderr.as_mut() else {
            return Ok(None);
        };

        let read = stderr.read_until(b'\n', &mut self.pending).await?;
        if read == 0 && self.pending.is_empty() {
            return Ok(None);
        }

        // Probe output is not guaranteed to be UTF-8
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Ok(Some(line))
    }

    async fn wait(&mut self) -> io::Result<ExitStatus> {
        // Close our end of the pipe so a child blocked on a full stderr can still exit
        self.stderr = None;

        let status = self.child.wait().await?;
        debug!(status = ?status, "Probe server reaped");
        Ok(status.into())
    }

    async fn terminate(&mut self, grace: Duration) -> io::Result<()> {
        let Some(pid) = self.child.id() else {
            // Already reaped
            return Ok(());
        };

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            info!(pid = %pid, "Sending SIGTERM to probe server");
            match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) => match tokio::time::timeout(grace, self.child.wait()).await {
                    Ok(result) => {
                        result?;
                        info!(pid = %pid, "Probe server exited after SIGTERM");
                        return Ok(());
                    }
                    Err(_) => {
                        warn!(
                            pid = %pid,
                            grace_ms = grace.as_millis() as u64,
                            "Probe server ignored SIGTERM, sending SIGKILL"
                        );
                    }
                },
                Err(e) => warn!(pid = %pid, error = %e, "SIGTERM failed, killing probe server"),
            }
        }

        #[cfg(not(unix))]
        {
            // No SIGTERM equivalent; kill straight away
            let _ = grace;
            info!(pid = %pid, "Killing probe server");
        }

        self.child.kill().await
    }
}
