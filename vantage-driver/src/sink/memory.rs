use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use jiff::civil::DateTime;

use super::{Message, Sink};

/// In-memory sink.
/// Keeps every delivered message so tests can inspect them, and can be
/// told to refuse deliveries.
#[derive(Clone)]
pub struct MemorySink {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    messages: Vec<Message>,
    connected: bool,
    reconnected: bool,
    newest_record_time: Option<DateTime>,
    failing_sends: usize,
}

/// Error type for MemorySink
#[derive(Debug)]
pub enum MemorySinkError {
    MutexPoisoned(String),
    Refused,
}

impl std::error::Error for MemorySinkError {}

impl fmt::Display for MemorySinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemorySinkError::MutexPoisoned(msg) => write!(f, "Mutex poisoned: {}", msg),
            MemorySinkError::Refused => write!(f, "Delivery refused"),
        }
    }
}

impl<T> From<PoisonError<T>> for MemorySinkError {
    fn from(err: PoisonError<T>) -> Self {
        MemorySinkError::MutexPoisoned(err.to_string())
    }
}

impl MemorySink {
    /// A connected sink with no earlier deliveries.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                messages: Vec::new(),
                connected: true,
                reconnected: true,
                newest_record_time: None,
                failing_sends: 0,
            })),
        }
    }

    /// Report `time` as the newest archive record already delivered.
    pub fn with_newest_record_time(self, time: DateTime) -> Self {
        self.lock().newest_record_time = Some(time);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop or restore the connection. Reconnecting is reported once through
    /// [`Sink::take_reconnected`].
    pub fn set_connected(&self, connected: bool) {
        let mut inner = self.lock();
        if connected && !inner.connected {
            inner.reconnected = true;
        }
        inner.connected = connected;
    }

    /// Refuse the next `count` deliveries.
    pub fn fail_next_sends(&self, count: usize) {
        self.lock().failing_sends = count;
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    /// The [`Message::kind`] of every delivered message, in order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.lock().messages.iter().map(Message::kind).collect()
    }

    pub fn clear(&self) {
        self.lock().messages.clear();
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for MemorySink {
    type Error = MemorySinkError;

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn take_reconnected(&self) -> bool {
        let mut inner = self.lock();
        inner.connected && std::mem::take(&mut inner.reconnected)
    }

    fn newest_record_time(&self) -> Option<DateTime> {
        self.lock().newest_record_time
    }

    fn send(&self, message: &Message) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock()?;
        if !inner.connected {
            return Err(MemorySinkError::Refused);
        }
        if inner.failing_sends > 0 {
            inner.failing_sends -= 1;
            return Err(MemorySinkError::Refused);
        }
        if let Message::Archive { record } = message {
            inner.newest_record_time = Some(record.time);
        }
        inner.messages.push(message.clone());
        Ok(())
    }

    fn disconnect(&self) {
        self.lock().connected = false;
    }
}
