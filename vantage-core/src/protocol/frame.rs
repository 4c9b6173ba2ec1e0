//! Building LOOP-shaped frames, for simulated consoles and tests.

use super::{CARRIAGE_RETURN, CRC_SIZE, LINE_FEED, LOOP_MAGIC, LOOP_PACKET_SIZE, crc};

/// A frame with magic, type and trailer set and every field zero.
/// The trend byte is `P`, as sent by rev A firmware.
pub fn blank_frame(packet_type: u8) -> [u8; LOOP_PACKET_SIZE] {
    let mut frame = [0u8; LOOP_PACKET_SIZE];
    frame[..3].copy_from_slice(LOOP_MAGIC);
    frame[3] = b'P';
    frame[4] = packet_type;
    frame[95] = LINE_FEED;
    frame[96] = CARRIAGE_RETURN;
    seal(&mut frame);
    frame
}

/// Write a little-endian word at `offset`.
pub fn put_i16(bytes: &mut [u8], offset: usize, value: i16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

/// Rewrite the trailing CRC after the frame was edited.
pub fn seal(frame: &mut [u8]) {
    let len = frame.len() - CRC_SIZE;
    let crc = crc::calculate(&frame[..len]);
    frame[len..].copy_from_slice(&crc.to_be_bytes());
}
