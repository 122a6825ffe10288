// Process Launcher Port
// Abstraction over spawning the probe server and owning its diagnostic stream

use crate::domain::{ExitStatus, LaunchSpec};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Launch errors (the child never started)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("Executable not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Spawn failed: {0}")]
    SpawnFailed(String),
}

impl LaunchError {
    /// Classify a spawn failure by its io::ErrorKind
    pub fn from_io(executable: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => LaunchError::NotFound(executable.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                LaunchError::PermissionDenied(executable.to_string())
            }
            _ => LaunchError::SpawnFailed(format!("{executable}: {err}")),
        }
    }
}

/// Handle to a spawned probe server
///
/// Owns the child process together with its diagnostic (stderr) stream.
/// Dropping the handle must release both.
#[async_trait]
pub trait ProbeProcess: Send {
    /// OS process id, if the platform exposes one
    fn pid(&self) -> Option<u32>;

    /// Read the next diagnostic line
    ///
    /// Returns `Ok(None)` once the stream is closed. The returned text may still
    /// carry its line terminator.
    async fn next_line(&mut self) -> std::io::Result<Option<String>>;

    /// Block until the process exits and reap it
    async fn wait(&mut self) -> std::io::Result<ExitStatus>;

    /// Ask the process to stop, escalating to a hard kill once `grace` elapses
    async fn terminate(&mut self, grace: Duration) -> std::io::Result<()>;
}

/// Process Launcher trait
///
/// Implementations:
/// - TokioProcessLauncher (infra-system): real OS processes
/// - MockProcessLauncher: scripted processes for tests
pub trait ProcessLauncher: Send + Sync {
    /// Spawn the probe server described by `spec`
    ///
    /// # Errors
    /// - LaunchError::NotFound if the executable cannot be resolved
    /// - LaunchError::PermissionDenied if it cannot be executed
    /// - LaunchError::SpawnFailed for any other spawn failure
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ProbeProcess>, LaunchError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// One scripted read from the diagnostic stream
    #[derive(Debug, Clone)]
    pub enum ScriptedRead {
        Line(String),
        Fail(std::io::ErrorKind, String),
    }

    /// Counters shared between a mock process and the test
    #[derive(Debug, Default)]
    pub struct ProcessCalls {
        pub reads: AtomicUsize,
        pub waits: AtomicUsize,
        pub terminations: AtomicUsize,
        /// Grace period handed to the last terminate call
        pub last_grace: Mutex<Option<Duration>>,
    }

    impl ProcessCalls {
        pub fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }

        pub fn waits(&self) -> usize {
            self.waits.load(Ordering::SeqCst)
        }

        pub fn terminations(&self) -> usize {
            self.terminations.load(Ordering::SeqCst)
        }

        pub fn last_grace(&self) -> Option<Duration> {
            *self.last_grace.lock().unwrap()
        }
    }

    /// Mock probe process replaying a fixed script
    pub struct MockProbeProcess {
        script: VecDeque<ScriptedRead>,
        exit_status: ExitStatus,
        terminated_status: ExitStatus,
        hang_at_end: bool,
        terminated: bool,
        calls: Arc<ProcessCalls>,
    }

    impl MockProbeProcess {
        /// Emit `lines` then close the stream and exit with `code`
        pub fn new(lines: &[&str], code: i32) -> Self {
            Self {
                script: lines
                    .iter()
                    .map(|l| ScriptedRead::Line(l.to_string()))
                    .collect(),
                exit_status: ExitStatus::Code(code),
                terminated_status: ExitStatus::Signal(15),
                hang_at_end: false,
                terminated: false,
                calls: Arc::new(ProcessCalls::default()),
            }
        }

        /// Replace the script with arbitrary reads (including failures)
        pub fn with_script(mut self, script: Vec<ScriptedRead>) -> Self {
            self.script = script.into();
            self
        }

        /// Keep the stream open forever after the script (until terminated)
        pub fn hanging(mut self) -> Self {
            self.hang_at_end = true;
            self
        }

        /// Shared call counters, to inspect after the process is handed off
        pub fn calls(&self) -> Arc<ProcessCalls> {
            Arc::clone(&self.calls)
        }
    }

    #[async_trait]
    impl ProbeProcess for MockProbeProcess {
        fn pid(&self) -> Option<u32> {
            None
        }

        async fn next_line(&mut self) -> std::io::Result<Option<String>> {
            self.calls.reads.fetch_add(1, Ordering::SeqCst);

            match self.script.pop_front() {
                Some(ScriptedRead::Line(line)) => Ok(Some(line)),
                Some(ScriptedRead::Fail(kind, msg)) => Err(std::io::Error::new(kind, msg)),
                None if self.hang_at_end && !self.terminated => {
                    std::future::pending::<()>().await;
                    Ok(None)
                }
                None => Ok(None),
            }
        }

        async fn wait(&mut self) -> std::io::Result<ExitStatus> {
            self.calls.waits.fetch_add(1, Ordering::SeqCst);
            if self.terminated {
                Ok(self.terminated_status)
            } else {
                Ok(self.exit_status)
            }
        }

        async fn terminate(&mut self, grace: Duration) -> std::io::Result<()> {
            self.calls.terminations.fetch_add(1, Ordering::SeqCst);
            *self.calls.last_grace.lock().unwrap() = Some(grace);
            self.terminated = true;
            Ok(())
        }
    }

    /// Mock launcher handing out pre-built processes in order
    pub struct MockProcessLauncher {
        processes: Mutex<VecDeque<MockProbeProcess>>,
        failure: Option<LaunchError>,
        launched: Mutex<Vec<LaunchSpec>>,
    }

    impl MockProcessLauncher {
        pub fn new(processes: Vec<MockProbeProcess>) -> Self {
            Self {
                processes: Mutex::new(processes.into()),
                failure: None,
                launched: Mutex::new(Vec::new()),
            }
        }

        /// Launcher whose every launch fails with `error`
        pub fn failing(error: LaunchError) -> Self {
            Self {
                processes: Mutex::new(VecDeque::new()),
                failure: Some(error),
                launched: Mutex::new(Vec::new()),
            }
        }

        /// Number of launch attempts (successful or not)
        pub fn launch_count(&self) -> usize {
            self.launched.lock().unwrap().len()
        }

        pub fn launched_specs(&self) -> Vec<LaunchSpec> {
            self.launched.lock().unwrap().clone()
        }
    }

    impl ProcessLauncher for MockProcessLauncher {
        fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ProbeProcess>, LaunchError> {
            self.launched.lock().unwrap().push(spec.clone());

            if let Some(err) = &self.failure {
                return Err(err.clone());
            }

            self.processes
                .lock()
                .unwrap()
                .pop_front()
                .map(|p| Box::new(p) as Box<dyn ProbeProcess>)
                .ok_or_else(|| LaunchError::SpawnFailed("no scripted process left".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_launch_error_classification() {
        let not_found = LaunchError::from_io("openocd", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(not_found, LaunchError::NotFound("openocd".to_string()));

        let denied =
            LaunchError::from_io("openocd", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(denied, LaunchError::PermissionDenied("openocd".to_string()));

        let other = LaunchError::from_io("openocd", io::Error::other("boom"));
        assert!(matches!(other, LaunchError::SpawnFailed(msg) if msg.contains("boom")));
    }
}
