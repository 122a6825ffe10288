// Central Error Type for the Supervisor

use thiserror::Error;

use crate::domain::ExitStatus;
use crate::port::LaunchError;

/// Supervisor-level error type
///
/// Launch failures ("never ran") and stream failures ("ran, then failed") are
/// kept distinct so callers can tell them apart.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    #[error("Diagnostic stream error: {source}")]
    Stream {
        #[source]
        source: std::io::Error,
        /// Status collected by the forced wait, if it succeeded
        exit_status: Option<ExitStatus>,
    },

    #[error("Wait failed: {0}")]
    Wait(String),

    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),
}

/// Result type alias using SupervisorError
pub type Result<T> = std::result::Result<T, SupervisorError>;
