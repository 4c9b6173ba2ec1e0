use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::info;

use super::Port;
use crate::error::StationError;

/// How long a single read blocks; the transport applies the overall deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A serial port that remembers how it was opened so it can be reopened.
pub struct SerialLink {
    path: String,
    baud_rate: u32,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialLink {
    /// Open `path` at `baud_rate`, 8N1 without flow control.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, StationError> {
        let port = open_port(path, baud_rate)?;
        info!(path, baud_rate, "Opened serial port");
        Ok(Self {
            path: path.to_owned(),
            baud_rate,
            port: Some(port),
        })
    }

    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port is closed"))
    }
}

fn open_port(path: &str, baud_rate: u32) -> Result<Box<dyn SerialPort>, serialport::Error> {
    serialport::new(path, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(POLL_INTERVAL)
        .open()
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port()?.read(buf)
    }
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port()?.flush()
    }
}

impl Port for SerialLink {
    fn clear_input(&mut self) -> io::Result<()> {
        self.port()?
            .clear(ClearBuffer::Input)
            .map_err(io::Error::from)
    }

    fn reopen(&mut self) -> io::Result<()> {
        // The device is opened exclusively, so the old handle goes first.
        self.port = None;
        self.port = Some(open_port(&self.path, self.baud_rate)?);
        info!(path = %self.path, baud_rate = self.baud_rate, "Reopened serial port");
        Ok(())
    }
}
