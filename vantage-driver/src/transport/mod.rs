pub mod mock;
pub mod serial;

use std::io::{self, ErrorKind, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use vantage_core::ProtocolError;
use vantage_core::protocol::{CARRIAGE_RETURN, LINE_FEED, WAKEUP_COMMAND, WAKEUP_RESPONSE};

use crate::error::StationError;

const WAKEUP_ATTEMPTS: usize = 5;
/// Upper bound for a single text line such as the firmware date.
const MAX_LINE_LENGTH: usize = 64;

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// A byte stream to the console.
///
/// Implemented by the serial port and by [`mock::MockConsole`].
pub trait Port: Read + Write + Send {
    /// Discard anything received but not yet read.
    fn clear_input(&mut self) -> io::Result<()>;

    /// Close and open the underlying device again.
    fn reopen(&mut self) -> io::Result<()>;
}

/// Settle times the console needs between exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Wait between sending a wakeup and reading the reply.
    pub wakeup_settle: Duration,
    /// Wait between consecutive LOOP and LOOP2 packets.
    pub packet_settle: Duration,
}

impl Pacing {
    /// The delays a real console requires.
    pub const CONSOLE: Pacing = Pacing {
        wakeup_settle: Duration::from_millis(100),
        packet_settle: Duration::from_secs(2),
    };

    /// No delays, for simulated consoles that answer instantly.
    pub const IMMEDIATE: Pacing = Pacing {
        wakeup_settle: Duration::ZERO,
        packet_settle: Duration::ZERO,
    };
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing::CONSOLE
    }
}

/// Framed access to the console link: exact-length reads with a deadline,
/// and the wakeup handshake.
pub struct Transport {
    port: Box<dyn Port>,
    read_timeout: Duration,
    pacing: Pacing,
}

impl Transport {
    pub fn new(port: impl Port + 'static, read_timeout: Duration, pacing: Pacing) -> Self {
        Self {
            port: Box::new(port),
            read_timeout,
            pacing,
        }
    }

    /// Open a serial console at `baud_rate`, 8N1 without flow control.
    pub fn open(path: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self, StationError> {
        let link = serial::SerialLink::open(path, baud_rate)?;
        Ok(Self::new(link, read_timeout, Pacing::CONSOLE))
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), StationError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read exactly `count` bytes.
    ///
    /// If the deadline passes first, whatever arrived is discarded together
    /// with the rest of the input buffer so the next exchange starts clean.
    pub fn read_exact(&mut self, count: usize) -> Result<Vec<u8>, StationError> {
        let deadline = Instant::now() + self.read_timeout;
        let mut buf = vec![0u8; count];
        let mut filled = 0;

        while filled < count {
            match self.port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(e.into()),
            }

            if filled < count && Instant::now() >= deadline {
                break;
            }
        }

        if filled < count {
            debug!(expected = count, received = filled, "Read timed out");
            self.discard_input()?;
            return Err(StationError::TransportTimeout {
                expected: count,
                received: filled,
            });
        }

        Ok(buf)
    }

    /// Read a text line terminated by `<CR>`, dropping the framing characters.
    pub fn read_line(&mut self) -> Result<String, StationError> {
        let mut line = Vec::new();
        loop {
            let byte = self.read_exact(1)?[0];
            match byte {
                CARRIAGE_RETURN => break,
                LINE_FEED => {}
                _ => line.push(byte),
            }
            if line.len() > MAX_LINE_LENGTH {
                self.discard_input()?;
                return Err(ProtocolError::LineTooLong(MAX_LINE_LENGTH).into());
            }
        }
        Ok(String::from_utf8_lossy(&line).trim().to_owned())
    }

    pub fn discard_input(&mut self) -> Result<(), StationError> {
        self.port.clear_input()?;
        Ok(())
    }

    /// Wake the console from its idle state.
    ///
    /// Also resynchronizes the console's command parser after a failed exchange.
    pub fn wakeup(&mut self) -> Result<(), StationError> {
        for attempt in 1..=WAKEUP_ATTEMPTS {
            self.write_all(WAKEUP_COMMAND)?;
            thread::sleep(self.pacing.wakeup_settle);

            match self.read_exact(WAKEUP_RESPONSE.len()) {
                Ok(reply) if reply == WAKEUP_RESPONSE => {
                    debug!(attempt, "Console is awake");
                    return Ok(());
                }
                Ok(reply) => {
                    debug!(attempt, ?reply, "Unexpected wakeup reply");
                    self.discard_input()?;
                }
                Err(StationError::TransportTimeout { .. }) => {
                    debug!(attempt, "No wakeup reply");
                }
                Err(e) => return Err(e),
            }
        }

        Err(StationError::WakeupFailed)
    }

    /// Close and open the port again, for a console that stopped answering.
    pub fn reopen(&mut self) -> Result<(), StationError> {
        warn!("Reopening console port");
        self.port.reopen()?;
        self.discard_input()
    }

    /// Release the port.
    pub fn close(self) {
        info!("Closing console port");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    /// Hands out a fixed byte stream, then nothing.
    struct Canned(VecDeque<u8>);

    impl Read for Canned {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.0.len());
            for (slot, byte) in buf.iter_mut().zip(self.0.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }
    }

    impl Write for Canned {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Port for Canned {
        fn clear_input(&mut self) -> io::Result<()> {
            self.0.clear();
            Ok(())
        }

        fn reopen(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn dummy_transport(bytes: &[u8]) -> Transport {
        let port = Canned(bytes.iter().copied().collect());
        Transport::new(port, Duration::from_millis(20), Pacing::IMMEDIATE)
    }

    #[test]
    fn line_drops_framing() {
        let mut transport = dummy_transport(b"Apr 10 2020\n\r");
        assert_eq!(transport.read_line().unwrap(), "Apr 10 2020");
    }

    #[test]
    fn endless_line_is_a_framing_error() {
        let mut bytes = vec![b'x'; 200];
        bytes.push(CARRIAGE_RETURN);
        let mut transport = dummy_transport(&bytes);

        let result = transport.read_line();

        assert!(matches!(
            result,
            Err(StationError::Protocol(ProtocolError::LineTooLong(MAX_LINE_LENGTH)))
        ));
        // The rest of the line was discarded with it.
        assert!(matches!(
            transport.read_exact(1),
            Err(StationError::TransportTimeout { received: 0, .. })
        ));
    }

    #[test]
    fn missing_line_end_times_out() {
        let mut transport = dummy_transport(b"Apr 10");
        assert!(matches!(
            transport.read_line(),
            Err(StationError::TransportTimeout { .. })
        ));
    }
}
