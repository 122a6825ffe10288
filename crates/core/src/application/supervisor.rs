// Probe Server Supervisor
// Spawns the debug-probe server, forwards its diagnostic stream live, reaps it

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::application::cancel::CancelToken;
use crate::application::config::SupervisorConfig;
use crate::domain::{ExitStatus, SessionReport, SessionState};
use crate::error::{Result, SupervisorError};
use crate::port::{LineSink, ProbeProcess, ProcessLauncher, TimeProvider};

/// How the read loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamOutcome {
    /// Diagnostic stream reached end-of-stream
    Closed { lines_forwarded: usize },
    /// Caller cancelled while the stream was still open
    Cancelled { lines_forwarded: usize },
}

impl StreamOutcome {
    fn lines_forwarded(&self) -> usize {
        match self {
            StreamOutcome::Closed { lines_forwarded }
            | StreamOutcome::Cancelled { lines_forwarded } => *lines_forwarded,
        }
    }
}

/// Supervises one probe server session per call
///
/// Holds no per-session state; every call spawns and owns its own child.
pub struct ProbeServerSupervisor {
    config: SupervisorConfig,
    launcher: Arc<dyn ProcessLauncher>,
    time_provider: Arc<dyn TimeProvider>,
}

impl ProbeServerSupervisor {
    /// Create a new supervisor
    ///
    /// # Arguments
    /// * `config` - Explicit configuration (root directory, executable, ...)
    /// * `launcher` - Process launcher (OS adapter or mock)
    /// * `time_provider` - Time provider for session duration tracking
    ///
    /// # Example
    /// ```ignore
    /// let supervisor = ProbeServerSupervisor::new(
    ///     SupervisorConfig::with_root("/opt/bsp/mini2440"),
    ///     Arc::new(TokioProcessLauncher::new()),
    ///     Arc::new(SystemTimeProvider),
    /// );
    /// let status = supervisor.run(&sink).await?;
    /// ```
    pub fn new(
        config: SupervisorConfig,
        launcher: Arc<dyn ProcessLauncher>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            config,
            launcher,
            time_provider,
        }
    }

    /// Run one session to completion and return the child's exit status
    ///
    /// A non-zero exit status is data, not an error.
    ///
    /// # Errors
    /// - SupervisorError::Configuration if the root directory is missing (nothing spawned)
    /// - SupervisorError::Launch if the child could not be spawned
    /// - SupervisorError::Stream if reading diagnostics failed (the child is still reaped first)
    /// - SupervisorError::Wait if reaping the child failed
    pub async fn run(&self, sink: &dyn LineSink) -> Result<ExitStatus> {
        self.supervise(sink, None).await.map(|report| report.status)
    }

    /// Run one session that the caller may cancel
    ///
    /// On cancellation the child is terminated and reaped before returning a
    /// report with `cancelled` set.
    pub async fn run_cancellable(
        &self,
        sink: &dyn LineSink,
        cancel: CancelToken,
    ) -> Result<SessionReport> {
        self.supervise(sink, Some(cancel)).await
    }

    async fn supervise(
        &self,
        sink: &dyn LineSink,
        mut cancel: Option<CancelToken>,
    ) -> Result<SessionReport> {
        let mut state = SessionState::NotStarted;

        let spec = self.config.launch_spec()?;
        advance(&mut state, SessionState::Spawning)?;

        info!(
            executable = %spec.executable(),
            config_file = %spec.config_file(),
            stdout = %spec.stdout(),
            "Launching probe server"
        );

        let start_time = self.time_provider.now_millis();
        let mut process = match self.launcher.launch(&spec) {
            Ok(process) => process,
            Err(e) => {
                advance(&mut state, SessionState::Failed)?;
                error!(executable = %spec.executable(), error = %e, "Probe server failed to start");
                return Err(e.into());
            }
        };
        drop(spec);

        advance(&mut state, SessionState::Streaming)?;
        debug!(pid = ?process.pid(), "Streaming probe server diagnostics");

        let streamed = drain(&mut *process, sink, cancel.as_mut()).await;

        if let Ok(StreamOutcome::Cancelled { .. }) = streamed {
            advance(&mut state, SessionState::Terminating)?;
            info!(pid = ?process.pid(), "Session cancelled, terminating probe server");
            if let Err(e) = process.terminate(self.config.terminate_grace).await {
                warn!(pid = ?process.pid(), error = %e, "Failed to terminate probe server");
            }
        }

        // Always reap, including after a stream failure
        advance(&mut state, SessionState::Waiting)?;
        let status = match process.wait().await {
            Ok(status) => status,
            Err(e) => {
                advance(&mut state, SessionState::Failed)?;
                error!(error = %e, "Failed to wait for probe server");
                return Err(match streamed {
                    Err(stream_err) => SupervisorError::Stream {
                        source: stream_err,
                        exit_status: None,
                    },
                    Ok(_) => SupervisorError::Wait(e.to_string()),
                });
            }
        };
        advance(&mut state, SessionState::Exited(status))?;
        drop(process);

        let outcome = match streamed {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(exit_status = %status, error = %e, "Diagnostic stream failed");
                return Err(SupervisorError::Stream {
                    source: e,
                    exit_status: Some(status),
                });
            }
        };

        let duration_ms = self.time_provider.now_millis() - start_time;
        let report = SessionReport {
            status,
            lines_forwarded: outcome.lines_forwarded(),
            duration_ms,
            cancelled: matches!(outcome, StreamOutcome::Cancelled { .. }),
        };
        advance(&mut state, SessionState::Done)?;

        info!(
            exit_status = %report.status,
            lines_forwarded = report.lines_forwarded,
            duration_ms = report.duration_ms,
            cancelled = report.cancelled,
            "Probe server session finished"
        );

        Ok(report)
    }
}

fn advance(state: &mut SessionState, next: SessionState) -> Result<()> {
    let from = *state;
    *state = from.transition(next)?;
    debug!(from = %from, to = %next, "Session state transition");
    Ok(())
}

/// Forward diagnostic lines until the stream closes or the caller cancels
///
/// End-of-stream is the only end-of-data signal; an empty line mid-stream is
/// skipped, not treated as the end.
async fn drain(
    process: &mut dyn ProbeProcess,
    sink: &dyn LineSink,
    mut cancel: Option<&mut CancelToken>,
) -> std::io::Result<StreamOutcome> {
    let mut lines_forwarded = 0;

    loop {
        let read = match cancel.as_deref_mut() {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    return Ok(StreamOutcome::Cancelled { lines_forwarded });
                }
                read = process.next_line() => read,
            },
            None => process.next_line().await,
        };

        match read? {
            Some(raw) => {
                let line = raw.trim_end_matches(['\r', '\n']);
                if !line.is_empty() {
                    sink.forward(line);
                    lines_forwarded += 1;
                }
            }
            None => return Ok(StreamOutcome::Closed { lines_forwarded }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cancel::cancel_channel;
    use crate::application::constants::DEFAULT_TERMINATE_GRACE;
    use crate::port::line_sink::mocks::RecordingSink;
    use crate::port::process_launcher::mocks::{
        MockProbeProcess, MockProcessLauncher, ScriptedRead,
    };
    use crate::port::time_provider::mocks::SteppingTimeProvider;
    use crate::port::time_provider::SystemTimeProvider;
    use crate::port::LaunchError;
    use std::time::Duration;

    fn supervisor(config: SupervisorConfig, launcher: Arc<MockProcessLauncher>) -> ProbeServerSupervisor {
        ProbeServerSupervisor::new(config, launcher, Arc::new(SystemTimeProvider))
    }

    #[tokio::test]
    async fn test_missing_root_spawns_nothing() {
        let launcher = Arc::new(MockProcessLauncher::new(vec![MockProbeProcess::new(&[], 0)]));
        let sink = RecordingSink::new();

        let result = supervisor(SupervisorConfig::default(), launcher.clone())
            .run(&sink)
            .await;

        assert!(matches!(result, Err(SupervisorError::Configuration(_))));
        assert_eq!(launcher.launch_count(), 0);
        assert!(sink.lines().is_empty());
    }

    #[tokio::test]
    async fn test_forwards_lines_and_returns_status() {
        let launcher = Arc::new(MockProcessLauncher::new(vec![MockProbeProcess::new(
            &["A", "B", ""],
            0,
        )]));
        let sink = RecordingSink::new();

        let status = supervisor(SupervisorConfig::with_root("/bsp"), launcher.clone())
            .run(&sink)
            .await
            .unwrap();

        assert_eq!(status, ExitStatus::Code(0));
        assert_eq!(sink.lines(), vec!["A", "B"]);

        let specs = launcher.launched_specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].args(), ["-f", "/bsp/openocd_jz2440v3.cfg"]);
    }

    #[tokio::test]
    async fn test_silent_failing_child() {
        let launcher = Arc::new(MockProcessLauncher::new(vec![MockProbeProcess::new(&[], 1)]));
        let sink = RecordingSink::new();

        let status = supervisor(SupervisorConfig::with_root("/bsp"), launcher)
            .run(&sink)
            .await
            .unwrap();

        assert_eq!(status, ExitStatus::Code(1));
        assert!(sink.lines().is_empty());
    }

    #[tokio::test]
    async fn test_stream_error_still_waits() {
        let process = MockProbeProcess::new(&[], 2).with_script(vec![
            ScriptedRead::Line("Open On-Chip Debugger 0.12.0".to_string()),
            ScriptedRead::Fail(std::io::ErrorKind::BrokenPipe, "pipe broke".to_string()),
            ScriptedRead::Line("never read".to_string()),
        ]);
        let calls = process.calls();
        let launcher = Arc::new(MockProcessLauncher::new(vec![process]));
        let sink = RecordingSink::new();

        let result = supervisor(SupervisorConfig::with_root("/bsp"), launcher)
            .run(&sink)
            .await;

        match result {
            Err(SupervisorError::Stream {
                source,
                exit_status,
            }) => {
                // Error kind survives for callers that branch on it
                assert_eq!(source.kind(), std::io::ErrorKind::BrokenPipe);
                assert!(source.to_string().contains("pipe broke"));
                assert_eq!(exit_status, Some(ExitStatus::Code(2)));
            }
            other => panic!("Expected stream error, got {other:?}"),
        }
        assert_eq!(calls.waits(), 1);
        assert_eq!(calls.reads(), 2);
        assert_eq!(sink.lines(), vec!["Open On-Chip Debugger 0.12.0"]);
    }

    #[tokio::test]
    async fn test_launch_error_is_distinct() {
        let launcher = Arc::new(MockProcessLauncher::failing(LaunchError::NotFound(
            "openocd".to_string(),
        )));
        let sink = RecordingSink::new();

        let result = supervisor(SupervisorConfig::with_root("/bsp"), launcher.clone())
            .run(&sink)
            .await;

        assert!(matches!(
            result,
            Err(SupervisorError::Launch(LaunchError::NotFound(_)))
        ));
        assert_eq!(launcher.launch_count(), 1);
        assert!(sink.lines().is_empty());
    }

    #[tokio::test]
    async fn test_empty_line_mid_stream_is_not_end_of_stream() {
        let process = MockProbeProcess::new(&["Info : target halted", "", "Info : resumed"], 0);
        let calls = process.calls();
        let launcher = Arc::new(MockProcessLauncher::new(vec![process]));
        let sink = RecordingSink::new();

        supervisor(SupervisorConfig::with_root("/bsp"), launcher)
            .run(&sink)
            .await
            .unwrap();

        assert_eq!(sink.lines(), vec!["Info : target halted", "Info : resumed"]);
        // Three lines plus the end-of-stream read
        assert_eq!(calls.reads(), 4);
    }

    #[tokio::test]
    async fn test_only_line_terminators_are_trimmed() {
        let launcher = Arc::new(MockProcessLauncher::new(vec![MockProbeProcess::new(
            &["Warn : adapter speed\r\n", "  indented  \n", "\r\n"],
            0,
        )]));
        let sink = RecordingSink::new();

        supervisor(SupervisorConfig::with_root("/bsp"), launcher)
            .run(&sink)
            .await
            .unwrap();

        assert_eq!(sink.lines(), vec!["Warn : adapter speed", "  indented  "]);
    }

    #[tokio::test]
    async fn test_sequential_sessions_are_independent() {
        let first = MockProbeProcess::new(&["first"], 0);
        let second = MockProbeProcess::new(&["second"], 4);
        let first_calls = first.calls();
        let second_calls = second.calls();
        let launcher = Arc::new(MockProcessLauncher::new(vec![first, second]));
        let supervisor = supervisor(SupervisorConfig::with_root("/bsp"), launcher.clone());

        let sink_a = RecordingSink::new();
        let sink_b = RecordingSink::new();
        let status_a = supervisor.run(&sink_a).await.unwrap();
        let status_b = supervisor.run(&sink_b).await.unwrap();

        assert_eq!(status_a, ExitStatus::Code(0));
        assert_eq!(status_b, ExitStatus::Code(4));
        assert_eq!(sink_a.lines(), vec!["first"]);
        assert_eq!(sink_b.lines(), vec!["second"]);
        assert_eq!(first_calls.waits(), 1);
        assert_eq!(second_calls.waits(), 1);
        assert_eq!(launcher.launch_count(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_terminates_before_reaping() {
        let process = MockProbeProcess::new(&["Info : Listening on port 3333", "Info : halted"], 0)
            .hanging();
        let calls = process.calls();
        let launcher = Arc::new(MockProcessLauncher::new(vec![process]));
        let sink = RecordingSink::new();
        let (handle, token) = cancel_channel();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        });

        let report = supervisor(SupervisorConfig::with_root("/bsp"), launcher)
            .run_cancellable(&sink, token)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.lines_forwarded, 2);
        assert_eq!(report.status, ExitStatus::Signal(15));
        assert_eq!(calls.terminations(), 1);
        assert_eq!(calls.last_grace(), Some(DEFAULT_TERMINATE_GRACE));
        assert_eq!(calls.waits(), 1);
    }

    #[tokio::test]
    async fn test_configured_grace_reaches_terminate() {
        let process = MockProbeProcess::new(&["Info : Listening on port 4444"], 0).hanging();
        let calls = process.calls();
        let launcher = Arc::new(MockProcessLauncher::new(vec![process]));
        let sink = RecordingSink::new();
        let (handle, token) = cancel_channel();
        let config = SupervisorConfig {
            terminate_grace: Duration::from_millis(100),
            ..SupervisorConfig::with_root("/bsp")
        };
        handle.cancel();

        let report = supervisor(config, launcher)
            .run_cancellable(&sink, token)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(calls.last_grace(), Some(Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn test_uncancelled_session_reports_duration() {
        let launcher = Arc::new(MockProcessLauncher::new(vec![MockProbeProcess::new(
            &["one", "two"],
            0,
        )]));
        let sink = RecordingSink::new();
        let (_handle, token) = cancel_channel();
        let supervisor = ProbeServerSupervisor::new(
            SupervisorConfig::with_root("/bsp"),
            launcher,
            Arc::new(SteppingTimeProvider::new(1_000, 250)),
        );

        let report = supervisor.run_cancellable(&sink, token).await.unwrap();

        assert!(!report.cancelled);
        assert_eq!(report.lines_forwarded, 2);
        assert_eq!(report.duration_ms, 250);
    }
}
