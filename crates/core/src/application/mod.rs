// Application Layer - Supervisor use case

pub mod cancel;
pub mod config;
pub mod constants;
pub mod supervisor;

// Re-exports
pub use cancel::{cancel_channel, CancelHandle, CancelToken};
pub use config::SupervisorConfig;
pub use supervisor::ProbeServerSupervisor;
