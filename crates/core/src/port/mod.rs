// Port Layer - Interfaces for external dependencies

pub mod line_sink;
pub mod process_launcher;
pub mod time_provider;

// Re-exports
pub use line_sink::{channel_sink, ChannelSink, LineSink};
pub use process_launcher::{LaunchError, ProbeProcess, ProcessLauncher};
pub use time_provider::TimeProvider;
