//! CRC-16/XMODEM as used by the console: polynomial 0x1021, initial value 0,
//! transmitted high byte first after the data it covers.

use ::crc::{CRC_16_XMODEM, Crc};

use super::{ParseResult, ProtocolError};

const XMODEM: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

pub fn calculate(bytes: &[u8]) -> u16 {
    XMODEM.checksum(bytes)
}

/// Verify the CRC trailing the first `length` bytes of `bytes`.
///
/// Returns false when the buffer is too short to hold the CRC.
pub fn verify(bytes: &[u8], length: usize) -> bool {
    check(bytes, length).is_ok()
}

/// Like [`verify`] but reports the mismatching values.
pub fn check(bytes: &[u8], length: usize) -> ParseResult<()> {
    super::check_length(bytes, length + 2)?;
    let expected = u16::from_be_bytes([bytes[length], bytes[length + 1]]);
    let actual = calculate(&bytes[..length]);
    if expected != actual {
        return Err(ProtocolError::CrcMismatch { expected, actual });
    }
    Ok(())
}

/// Append the big-endian CRC of `payload` to it.
pub fn append(payload: &mut Vec<u8>) {
    let crc = calculate(payload);
    payload.extend_from_slice(&crc.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // CRC-16/XMODEM check value
        assert_eq!(calculate(b"123456789"), 0x31C3);
    }

    #[test]
    fn whole_frame_with_crc_sums_to_zero() {
        let mut frame = b"console frame".to_vec();
        append(&mut frame);
        assert_eq!(calculate(&frame), 0);
    }

    #[test]
    fn appended_crc_verifies() {
        for len in [0usize, 1, 4, 97, 265] {
            let mut payload: Vec<u8> = (0..len).map(|i| (i * 37 % 251) as u8).collect();
            append(&mut payload);
            assert!(verify(&payload, len), "length {len}");
        }
    }

    #[test]
    fn any_single_bit_flip_is_detected() {
        let mut frame = vec![0x4c, 0x4f, 0x4f, 0x00, 0x12, 0xff, 0x80];
        append(&mut frame);
        let len = frame.len() - 2;

        for byte in 0..frame.len() {
            for bit in 0..8 {
                let mut corrupted = frame.clone();
                corrupted[byte] ^= 1 << bit;
                assert!(!verify(&corrupted, len), "flip at byte {byte} bit {bit}");
            }
        }
    }

    #[test]
    fn short_buffer_does_not_verify() {
        assert!(!verify(&[0x01, 0x02], 1));
        assert_eq!(
            check(&[0x01], 1),
            Err(ProtocolError::InsufficientData {
                needed: 3,
                available: 1
            })
        );
    }
}
