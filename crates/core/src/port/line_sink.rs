// Line Sink Port
// Destination for forwarded diagnostic lines (console, logger, channel)

use tokio::sync::mpsc;
use tracing::debug;

/// Receives forwarded lines one at a time, in arrival order
pub trait LineSink: Send + Sync {
    fn forward(&self, line: &str);
}

/// Sink that hands lines to another task over an unbounded channel
///
/// Single producer, single consumer; ordering is preserved.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl LineSink for ChannelSink {
    fn forward(&self, line: &str) {
        if self.tx.send(line.to_string()).is_err() {
            debug!("Line receiver dropped, discarding forwarded line");
        }
    }
}

/// Create a channel sink and its receiving end
pub fn channel_sink() -> (ChannelSink, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink { tx }, rx)
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Records every forwarded line
    #[derive(Default)]
    pub struct RecordingSink {
        lines: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    impl LineSink for RecordingSink {
        fn forward(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }
    }
}
