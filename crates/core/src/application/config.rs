// Supervisor Configuration

use std::time::Duration;

use crate::application::constants::DEFAULT_TERMINATE_GRACE;
use crate::domain::{LaunchSpec, OutputMode, DEFAULT_CONFIG_SUFFIX, DEFAULT_PROBE_EXECUTABLE};
use crate::error::{Result, SupervisorError};

/// Explicit supervisor configuration
///
/// Populated once by the caller (flags, environment, file); the supervisor
/// never reads global state itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Board support root directory; required
    pub root_dir: Option<String>,
    pub executable: String,
    pub config_suffix: String,
    pub stdout: OutputMode,
    pub terminate_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            root_dir: None,
            executable: DEFAULT_PROBE_EXECUTABLE.to_string(),
            config_suffix: DEFAULT_CONFIG_SUFFIX.to_string(),
            stdout: OutputMode::Inherit,
            terminate_grace: DEFAULT_TERMINATE_GRACE,
        }
    }
}

impl SupervisorConfig {
    /// Default configuration rooted at `root_dir`
    pub fn with_root(root_dir: impl Into<String>) -> Self {
        Self {
            root_dir: Some(root_dir.into()),
            ..Default::default()
        }
    }

    /// Compose the launch spec for this configuration
    ///
    /// # Errors
    /// - SupervisorError::Configuration if the root directory is missing or empty,
    ///   or the executable is empty
    pub fn launch_spec(&self) -> Result<LaunchSpec> {
        let root_dir = self
            .root_dir
            .as_deref()
            .filter(|root| !root.is_empty())
            .ok_or_else(|| {
                SupervisorError::Configuration("root directory is not set".to_string())
            })?;

        LaunchSpec::compose(&self.executable, root_dir, &self.config_suffix, self.stdout)
            .map_err(|e| SupervisorError::Configuration(e.to_string()))
    }
}
