use jiff::civil::DateTime;
use tracing::{debug, instrument, warn};
use vantage_core::protocol::clock::{decode_console_time, encode_console_time};
use vantage_core::protocol::eeprom::EepromField;
use vantage_core::protocol::{
    ACK, CONSOLE_TIME_SIZE, CRC_SIZE, LINE_FEED, LOOP_PACKET_SIZE, OK_RESPONSE, crc,
};

use crate::error::StationError;
use crate::transport::{Pacing, Transport};

/// Attempts for a single command before giving up.
const COMMAND_ATTEMPTS: usize = 5;
const TEST_RESPONSE: &[u8] = b"\n\rTEST\n\r";

/// The console command set on top of a [`Transport`].
///
/// Every command is retried with a wakeup in between, which also
/// resynchronizes the console after a garbled exchange.
pub struct Console {
    transport: Transport,
}

impl Console {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub fn transport(&mut self) -> &mut Transport {
        &mut self.transport
    }

    pub fn close(self) {
        self.transport.close();
    }

    pub fn pacing(&self) -> Pacing {
        self.transport.pacing()
    }

    pub fn wakeup(&mut self) -> Result<(), StationError> {
        self.transport.wakeup()
    }

    /// Best-effort wakeup between retries.
    fn resync(&mut self) {
        if let Err(e) = self.transport.wakeup() {
            debug!(error = %e, "Wakeup between retries failed");
        }
    }

    fn send(&mut self, command: &str) -> Result<(), StationError> {
        let mut line = Vec::with_capacity(command.len() + 1);
        line.extend_from_slice(command.as_bytes());
        line.push(LINE_FEED);
        self.transport.write_all(&line)
    }

    /// Send a command answered by a single ACK byte.
    #[instrument(name = "send_acked", skip(self))]
    pub fn send_acked(&mut self, command: &str) -> Result<(), StationError> {
        for attempt in 1..=COMMAND_ATTEMPTS {
            self.send(command)?;
            match self.transport.read_exact(1) {
                Ok(reply) if reply[0] == ACK => return Ok(()),
                Ok(reply) => warn!(attempt, reply = reply[0], "Command not acknowledged"),
                Err(StationError::TransportTimeout { .. }) => warn!(attempt, "No reply"),
                Err(e) => return Err(e),
            }
            self.resync();
        }

        Err(StationError::NotAcknowledged {
            command: command.to_owned(),
        })
    }

    /// Send a command answered by `<LF><CR>OK<LF><CR>`.
    #[instrument(name = "send_oked", skip(self))]
    pub fn send_oked(&mut self, command: &str) -> Result<(), StationError> {
        for attempt in 1..=COMMAND_ATTEMPTS {
            self.send(command)?;
            match self.transport.read_exact(OK_RESPONSE.len()) {
                Ok(reply) if reply == OK_RESPONSE => return Ok(()),
                Ok(reply) => warn!(attempt, ?reply, "Command not acknowledged"),
                Err(StationError::TransportTimeout { .. }) => warn!(attempt, "No reply"),
                Err(e) => return Err(e),
            }
            self.resync();
        }

        Err(StationError::NotAcknowledged {
            command: command.to_owned(),
        })
    }

    /// Expect the ACK that closes a binary exchange.
    pub fn expect_ack(&mut self, what: &str) -> Result<(), StationError> {
        let reply = self.transport.read_exact(1)?;
        if reply[0] != ACK {
            return Err(StationError::NotAcknowledged {
                command: what.to_owned(),
            });
        }
        Ok(())
    }

    pub fn write_control(&mut self, control: u8) -> Result<(), StationError> {
        self.transport.write_all(&[control])
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<(), StationError> {
        self.transport.write_all(bytes)
    }

    /// Run `exchange` until it succeeds, resynchronizing after timeouts and
    /// CRC failures.
    fn retry<T>(
        &mut self,
        what: &str,
        mut exchange: impl FnMut(&mut Self) -> Result<T, StationError>,
    ) -> Result<T, StationError> {
        let mut attempt = 1;
        loop {
            match exchange(self) {
                Ok(value) => return Ok(value),
                Err(e @ (StationError::TransportTimeout { .. } | StationError::Protocol(_)))
                    if attempt < COMMAND_ATTEMPTS =>
                {
                    warn!(what, attempt, error = %e, "Retrying");
                    attempt += 1;
                    self.resync();
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Read `field.size` bytes of EEPROM.
    pub fn read_eeprom(&mut self, field: EepromField) -> Result<Vec<u8>, StationError> {
        self.retry("EEBRD", |console| {
            console.send_acked(&format!("EEBRD {} {:02X}", field.address, field.size))?;
            let mut data = console.transport.read_exact(field.size + CRC_SIZE)?;
            crc::check(&data, field.size)?;
            data.truncate(field.size);
            Ok(data)
        })
    }

    /// The console clock, in console local time.
    pub fn console_time(&mut self) -> Result<DateTime, StationError> {
        self.retry("GETTIME", |console| {
            console.send_acked("GETTIME")?;
            let data = console.transport.read_exact(CONSOLE_TIME_SIZE + CRC_SIZE)?;
            crc::check(&data, CONSOLE_TIME_SIZE)?;
            Ok(decode_console_time(&data)?)
        })
    }

    pub fn set_console_time(&mut self, time: DateTime) -> Result<(), StationError> {
        self.send_acked("SETTIME")?;
        let mut payload = encode_console_time(time).to_vec();
        crc::append(&mut payload);
        self.write(&payload)?;
        self.expect_ack("SETTIME")
    }

    pub fn firmware_date(&mut self) -> Result<String, StationError> {
        self.send_oked("VER")?;
        self.transport.read_line()
    }

    pub fn firmware_version(&mut self) -> Result<String, StationError> {
        self.send_oked("NVER")?;
        self.transport.read_line()
    }

    /// Check that the console echoes `TEST`.
    pub fn test(&mut self) -> Result<bool, StationError> {
        self.send("TEST")?;
        match self.transport.read_exact(TEST_RESPONSE.len()) {
            Ok(reply) => Ok(reply == TEST_RESPONSE),
            Err(StationError::TransportTimeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Start streaming `pairs` interleaved LOOP and LOOP2 packets.
    pub fn start_loop(&mut self, pairs: usize) -> Result<(), StationError> {
        self.send_acked(&format!("LPS 3 {}", pairs * 2))
    }

    pub fn read_frame(&mut self) -> Result<Vec<u8>, StationError> {
        self.transport.read_exact(LOOP_PACKET_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use jiff::civil::date;
    use vantage_core::protocol::eeprom;

    use super::*;
    use crate::transport::mock::{FIRMWARE_DATE, FIRMWARE_VERSION, MockConsole};

    fn dummy_console() -> (Console, MockConsole) {
        let mock = MockConsole::new();
        let transport = Transport::new(mock.clone(), Duration::from_millis(50), Pacing::IMMEDIATE);
        (Console::new(transport), mock)
    }

    #[test]
    fn console_time_roundtrip_through_device() {
        let (mut console, mock) = dummy_console();
        let time = date(2024, 3, 9).at(14, 5, 30, 0);

        console.set_console_time(time).unwrap();
        assert_eq!(mock.clock_sets(), vec![time]);
        assert_eq!(console.console_time().unwrap(), time);
    }

    #[test]
    fn reads_firmware_strings() {
        let (mut console, _) = dummy_console();
        assert_eq!(console.firmware_date().unwrap(), FIRMWARE_DATE);
        assert_eq!(console.firmware_version().unwrap(), FIRMWARE_VERSION);
    }

    #[test]
    fn eeprom_read_uses_hex_count() {
        let (mut console, mock) = dummy_console();
        let bytes = console.read_eeprom(eeprom::STATION_LIST).unwrap();

        assert_eq!(bytes.len(), 16);
        assert_eq!(mock.commands(), vec!["EEBRD 19 10"]);
    }

    #[test]
    fn test_command_echoes() {
        let (mut console, _) = dummy_console();
        assert!(console.test().unwrap());
    }

    #[test]
    fn unknown_command_is_retried_then_rejected() {
        let (mut console, mock) = dummy_console();
        let err = console.send_acked("BOGUS").unwrap_err();

        assert!(matches!(err, StationError::NotAcknowledged { .. }));
        let attempts = mock.commands().iter().filter(|c| *c == "BOGUS").count();
        assert_eq!(attempts, COMMAND_ATTEMPTS);
    }
}
