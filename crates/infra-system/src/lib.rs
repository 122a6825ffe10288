// Probe Bridge Infrastructure - System Adapters
// Implements: ProcessLauncher, ProbeProcess

pub mod tokio_launcher;

pub use tokio_launcher::{TokioProcessLauncher, TokioProbeProcess};
