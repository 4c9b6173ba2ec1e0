//! The console clock payload of GETTIME and SETTIME.

use jiff::civil::DateTime;

use super::{CONSOLE_TIME_SIZE, ParseResult, ProtocolError, check_length};

/// sec, min, hour, day, month, year - 1900.
pub fn encode_console_time(time: DateTime) -> [u8; CONSOLE_TIME_SIZE] {
    [
        time.second() as u8,
        time.minute() as u8,
        time.hour() as u8,
        time.day() as u8,
        time.month() as u8,
        (time.year() - 1900) as u8,
    ]
}

pub fn decode_console_time(bytes: &[u8]) -> ParseResult<DateTime> {
    check_length(bytes, CONSOLE_TIME_SIZE)?;
    DateTime::new(
        i16::from(bytes[5]) + 1900,
        bytes[4] as i8,
        bytes[3] as i8,
        bytes[2] as i8,
        bytes[1] as i8,
        bytes[0] as i8,
        0,
    )
    .map_err(|_| ProtocolError::InvalidTimestamp {
        date: u16::from_le_bytes([bytes[3], bytes[4]]),
        time: u16::from(bytes[2]) * 100 + u16::from(bytes[1]),
    })
}
