use std::sync::atomic::{AtomicBool, Ordering};

use jiff::civil::DateTime;
use tracing::info;

use super::{Message, Sink};

/// Writes every message as a JSON line through `tracing`.
///
/// Always connected; it has no record of earlier deliveries.
pub struct LogSink {
    connected: AtomicBool,
    announced: AtomicBool,
}

impl LogSink {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            announced: AtomicBool::new(false),
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for LogSink {
    type Error = serde_json::Error;

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn take_reconnected(&self) -> bool {
        self.is_connected() && !self.announced.swap(true, Ordering::AcqRel)
    }

    fn newest_record_time(&self) -> Option<DateTime> {
        None
    }

    fn send(&self, message: &Message) -> Result<(), Self::Error> {
        let json = serde_json::to_string(message)?;
        info!(target: "vantage_driver::sink", kind = message.kind(), "{json}");
        Ok(())
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        info!("Log sink disconnected");
    }
}
