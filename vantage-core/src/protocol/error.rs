use thiserror::Error;

pub type ParseResult<T> = core::result::Result<T, ProtocolError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("insufficient data: needed {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },
    #[error("invalid packet magic {0:02x?}")]
    InvalidMagic([u8; 3]),
    #[error("invalid barometric trend {0}")]
    InvalidBaroTrend(u8),
    #[error("invalid packet type {0}")]
    InvalidPacketType(u8),
    #[error("<LF><CR> trailer not found")]
    MissingTrailer,
    #[error("crc mismatch: expected {expected:#06x}, got {actual:#06x}")]
    CrcMismatch { expected: u16, actual: u16 },
    #[error("invalid timestamp: date {date:#06x}, time {time}")]
    InvalidTimestamp { date: u16, time: u16 },
    #[error("unknown rain collector setting {0:#04x}")]
    InvalidRainCollector(u8),
    #[error("year {0} cannot be packed into an archive date")]
    DateOutOfRange(i16),
    #[error("text line longer than {0} bytes")]
    LineTooLong(usize),
}
