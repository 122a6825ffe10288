// Launch Specification Domain Model

use serde::{Deserialize, Serialize};

use super::error::{DomainError, Result};

/// Debug-probe server binary, resolved through the caller's PATH
pub const DEFAULT_PROBE_EXECUTABLE: &str = "openocd";

/// Configuration file location relative to the board support root
pub const DEFAULT_CONFIG_SUFFIX: &str = "/openocd_jz2440v3.cfg";

/// Flag introducing a configuration file on the probe server command line
pub const CONFIG_FILE_FLAG: &str = "-f";

/// What happens to the child's standard output.
///
/// Standard error is always captured; it carries the diagnostic stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputMode {
    /// Child writes straight to our own stdout
    #[default]
    Inherit,
    /// Child stdout goes to the null device
    Discard,
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputMode::Inherit => write!(f, "INHERIT"),
            OutputMode::Discard => write!(f, "DISCARD"),
        }
    }
}

/// Fully composed probe server invocation.
///
/// Built once per session and immutable afterwards. The configuration path is
/// the root directory and suffix joined verbatim, without any normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    executable: String,
    config_file: String,
    args: Vec<String>,
    stdout: OutputMode,
}

impl LaunchSpec {
    /// Compose a launch spec from a root directory and a config suffix
    ///
    /// # Errors
    /// - DomainError::ValidationError if the root directory or executable is empty
    pub fn compose(
        executable: impl Into<String>,
        root_dir: &str,
        config_suffix: &str,
        stdout: OutputMode,
    ) -> Result<Self> {
        let executable = executable.into();

        if root_dir.is_empty() {
            return Err(DomainError::ValidationError(
                "root directory must not be empty".to_string(),
            ));
        }
        if executable.is_empty() {
            return Err(DomainError::ValidationError(
                "probe executable must not be empty".to_string(),
            ));
        }

        let config_file = format!("{root_dir}{config_suffix}");
        let args = vec![CONFIG_FILE_FLAG.to_string(), config_file.clone()];

        Ok(Self {
            executable,
            config_file,
            args,
            stdout,
        })
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn stdout(&self) -> OutputMode {
        self.stdout
    }
}

impl std::fmt::Display for LaunchSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.executable)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
