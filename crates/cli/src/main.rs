//! Probe Bridge CLI - runs the OpenOCD debug server and mirrors its diagnostics
//!
//! The supervisor runs on its own task; lines cross to the main task over a
//! channel so Ctrl+C stays responsive while the probe server is attached.

mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::future::Future;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

use probe_bridge_core::application::constants::{DEFAULT_TERMINATE_GRACE, ROOT_DIR_ENV};
use probe_bridge_core::application::{
    cancel_channel, CancelHandle, ProbeServerSupervisor, SupervisorConfig,
};
use probe_bridge_core::domain::{
    ExitStatus, OutputMode, SessionReport, DEFAULT_CONFIG_SUFFIX, DEFAULT_PROBE_EXECUTABLE,
};
use probe_bridge_core::port::channel_sink;
use probe_bridge_core::port::time_provider::SystemTimeProvider;
use probe_bridge_infra_system::TokioProcessLauncher;

#[derive(Parser)]
#[command(name = "probe-bridge")]
#[command(about = "Run the OpenOCD debug server and stream its diagnostics", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Board support root directory holding the probe configuration
    #[arg(long, global = true, env = ROOT_DIR_ENV)]
    bsp_root: Option<String>,

    /// Debug-probe server executable
    #[arg(long, global = true, env = "PROBE_BRIDGE_EXECUTABLE", default_value = DEFAULT_PROBE_EXECUTABLE)]
    executable: String,

    /// Configuration file path appended verbatim to the root directory
    #[arg(long, global = true, env = "PROBE_BRIDGE_CONFIG_SUFFIX", default_value = DEFAULT_CONFIG_SUFFIX)]
    config_suffix: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the probe server and stream its diagnostics (default)
    Run {
        /// Discard the probe server's stdout
        #[arg(long)]
        quiet: bool,

        /// Milliseconds between SIGTERM and SIGKILL after Ctrl+C
        #[arg(long, default_value_t = DEFAULT_TERMINATE_GRACE.as_millis() as u64)]
        grace_ms: u64,

        /// Session summary printed once the probe server exits
        #[arg(long, value_enum, default_value_t = SummaryFormat::Text)]
        summary: SummaryFormat,
    },

    /// Print the composed probe server command without running it
    Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SummaryFormat {
    Text,
    Json,
    #[value(name = "none")]
    Off,
}

impl Cli {
    fn supervisor_config(&self, stdout: OutputMode, terminate_grace: Duration) -> SupervisorConfig {
        SupervisorConfig {
            root_dir: self.bsp_root.clone(),
            executable: self.executable.clone(),
            config_suffix: self.config_suffix.clone(),
            stdout,
            terminate_grace,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    logging::init()?;

    let mut cli = Cli::parse();

    match cli.command.take() {
        Some(Commands::Command) => {
            let spec = cli
                .supervisor_config(OutputMode::Inherit, DEFAULT_TERMINATE_GRACE)
                .launch_spec()
                .with_context(|| format!("Cannot compose probe server command (is {ROOT_DIR_ENV} set?)"))?;
            println!("{spec}");
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Run {
            quiet,
            grace_ms,
            summary,
        }) => {
            let stdout = if quiet {
                OutputMode::Discard
            } else {
                OutputMode::Inherit
            };
            let config = cli.supervisor_config(stdout, Duration::from_millis(grace_ms));
            run_session(config, summary).await
        }
        None => {
            let config = cli.supervisor_config(OutputMode::Inherit, DEFAULT_TERMINATE_GRACE);
            run_session(config, SummaryFormat::Text).await
        }
    }
}

async fn run_session(config: SupervisorConfig, summary: SummaryFormat) -> Result<ExitCode> {
    // Fail before spawning anything if the root directory is missing
    config
        .launch_spec()
        .with_context(|| format!("Cannot compose probe server command (is {ROOT_DIR_ENV} set?)"))?;

    let launcher = Arc::new(TokioProcessLauncher::new());
    let supervisor = ProbeServerSupervisor::new(config, launcher, Arc::new(SystemTimeProvider));

    let (sink, mut lines) = channel_sink();
    let (cancel, token) = cancel_channel();

    let session = tokio::spawn(async move { supervisor.run_cancellable(&sink, token).await });

    pump_lines(
        &mut lines,
        &mut std::io::stdout(),
        tokio::signal::ctrl_c(),
        &cancel,
    )
    .await?;

    let report = session
        .await
        .context("Supervisor task panicked")?
        .context("Probe server session failed")?;

    print_summary(&report, summary)?;
    Ok(ExitCode::from(exit_code(report.status)))
}

/// Write forwarded lines to `out` until the session closes the channel
///
/// The first completion of `interrupt` cancels the session; lines keep
/// flowing until the terminated child has been reaped.
async fn pump_lines<W: Write>(
    lines: &mut UnboundedReceiver<String>,
    out: &mut W,
    interrupt: impl Future<Output = std::io::Result<()>>,
    cancel: &CancelHandle,
) -> Result<()> {
    tokio::pin!(interrupt);
    let mut cancel_requested = false;

    // Sink is dropped with the session task, which closes the channel
    loop {
        tokio::select! {
            line = lines.recv() => match line {
                Some(line) => writeln!(out, "{line}").context("Failed to write probe output")?,
                None => break,
            },
            signal = &mut interrupt, if !cancel_requested => {
                signal.context("Failed to listen for Ctrl+C")?;
                info!("Ctrl+C received, stopping probe server");
                cancel.cancel();
                cancel_requested = true;
            }
        }
    }

    Ok(())
}

fn print_summary(report: &SessionReport, format: SummaryFormat) -> Result<()> {
    match format {
        SummaryFormat::Text => {
            let status = if report.status.success() {
                report.status.to_string().green()
            } else {
                report.status.to_string().red()
            };
            let cancelled = if report.cancelled { ", cancelled" } else { "" };
            eprintln!(
                "{} {} ({} lines, {} ms{})",
                "probe server:".bold(),
                status,
                report.lines_forwarded,
                report.duration_ms,
                cancelled
            );
        }
        SummaryFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        SummaryFormat::Off => {}
    }
    Ok(())
}

/// Mirror the child's status as our own exit code
fn exit_code(status: ExitStatus) -> u8 {
    u8::try_from(status.shell_code()).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_bridge_core::port::LineSink;

    #[test]
    fn test_command_line_overrides() {
        let cli = Cli::try_parse_from([
            "probe-bridge",
            "--bsp-root",
            "/opt/bsp/mini2440",
            "--config-suffix",
            "/board/jlink.cfg",
            "run",
            "--quiet",
            "--grace-ms",
            "250",
            "--summary",
            "none",
        ])
        .unwrap();

        match &cli.command {
            Some(Commands::Run {
                quiet,
                grace_ms,
                summary,
            }) => {
                assert!(*quiet);
                assert_eq!(*grace_ms, 250);
                assert_eq!(*summary, SummaryFormat::Off);
            }
            _ => panic!("Expected run subcommand"),
        }

        let spec = cli
            .supervisor_config(OutputMode::Discard, Duration::from_millis(250))
            .launch_spec()
            .unwrap();
        assert_eq!(spec.config_file(), "/opt/bsp/mini2440/board/jlink.cfg");
    }

    #[tokio::test]
    async fn test_pump_writes_lines_until_session_ends() {
        let (sink, mut lines) = channel_sink();
        let (cancel, _token) = cancel_channel();
        for line in ["Open On-Chip Debugger 0.12.0", "Info : Listening on port 3333"] {
            sink.forward(line);
        }
        drop(sink);

        let mut out = Vec::new();
        pump_lines(&mut lines, &mut out, std::future::pending(), &cancel)
            .await
            .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Open On-Chip Debugger 0.12.0\nInfo : Listening on port 3333\n"
        );
    }

    #[tokio::test]
    async fn test_pump_interrupt_cancels_and_drains() {
        let (sink, mut lines) = channel_sink();
        let (cancel, mut token) = cancel_channel();
        sink.forward("Info : halted");

        // Stand-in session: closes the channel only once cancelled
        let session = tokio::spawn(async move {
            token.cancelled().await;
            sink.forward("shutdown command invoked");
        });

        let mut out = Vec::new();
        pump_lines(&mut lines, &mut out, async { Ok(()) }, &cancel)
            .await
            .unwrap();
        session.await.unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Info : halted\nshutdown command invoked\n"
        );
    }

    #[test]
    fn test_exit_code_mirrors_child() {
        assert_eq!(exit_code(ExitStatus::Code(0)), 0);
        assert_eq!(exit_code(ExitStatus::Code(3)), 3);
        assert_eq!(exit_code(ExitStatus::Signal(15)), 143);
        assert_eq!(exit_code(ExitStatus::Code(-1)), 1);
    }
}
