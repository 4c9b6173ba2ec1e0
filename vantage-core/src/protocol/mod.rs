pub mod archive;
pub mod clock;
pub mod crc;
pub mod eeprom;
pub mod error;
pub mod frame;
pub mod loop2_packet;
pub mod loop_packet;

pub use error::{ParseResult, ProtocolError};

pub const ACK: u8 = 0x06;
/// Ask the console to resend the last archive page.
pub const NACK: u8 = 0x41;
pub const CANCEL: u8 = 0x30;
/// Abort an archive download.
pub const ESCAPE: u8 = 0x33;
pub const LINE_FEED: u8 = b'\n';
pub const CARRIAGE_RETURN: u8 = b'\r';

pub const WAKEUP_COMMAND: &[u8] = b"\n";
pub const WAKEUP_RESPONSE: &[u8] = b"\n\r";
pub const OK_RESPONSE: &[u8] = b"\n\rOK\n\r";

pub const CRC_SIZE: usize = 2;

pub const LOOP_PACKET_SIZE: usize = 99;
pub const LOOP_MAGIC: &[u8; 3] = b"LOO";
pub const LOOP_PACKET_TYPE: u8 = 0;
pub const LOOP2_PACKET_TYPE: u8 = 1;

pub const ARCHIVE_RECORD_SIZE: usize = 52;
pub const RECORDS_PER_PAGE: usize = 5;
/// Sequence byte, five records and four unused bytes. The CRC follows.
pub const ARCHIVE_PAGE_SIZE: usize = 1 + RECORDS_PER_PAGE * ARCHIVE_RECORD_SIZE + 4;
pub const ARCHIVE_PAGE_COUNT: u16 = 512;

/// Payload of the dump-after timestamp and of the page-count reply.
pub const DUMP_AFTER_PAYLOAD_SIZE: usize = 4;
/// sec, min, hour, day, month, year - 1900.
pub const CONSOLE_TIME_SIZE: usize = 6;

pub(crate) fn read_i16(bytes: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

/// Check the `<LF><CR>` trailer that closes LOOP and LOOP2 frames.
pub(crate) fn check_trailer(bytes: &[u8]) -> ParseResult<()> {
    if bytes[95] != LINE_FEED || bytes[96] != CARRIAGE_RETURN {
        return Err(ProtocolError::MissingTrailer);
    }
    Ok(())
}

pub(crate) fn check_length(bytes: &[u8], needed: usize) -> ParseResult<()> {
    if bytes.len() < needed {
        return Err(ProtocolError::InsufficientData {
            needed,
            available: bytes.len(),
        });
    }
    Ok(())
}
