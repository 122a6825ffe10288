// Domain Layer - Pure session model and launch composition

pub mod error;
pub mod exit_status;
pub mod launch;
pub mod session;

// Re-exports
pub use error::DomainError;
pub use exit_status::ExitStatus;
pub use launch::{
    LaunchSpec, OutputMode, CONFIG_FILE_FLAG, DEFAULT_CONFIG_SUFFIX, DEFAULT_PROBE_EXECUTABLE,
};
pub use session::{SessionReport, SessionState};
