//! Console configuration stored in EEPROM and how to read it.

use super::{ParseResult, ProtocolError, check_length, read_i16};
use crate::station::{SensorStation, StationType};
use crate::{RainCollector, WindCupSize};

/// An EEPROM location: hex address as sent in the `EEBRD` command and byte count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EepromField {
    pub address: &'static str,
    pub size: usize,
}

pub const LATITUDE: EepromField = EepromField { address: "0B", size: 2 };
pub const LONGITUDE: EepromField = EepromField { address: "0D", size: 2 };
pub const ELEVATION: EepromField = EepromField { address: "0F", size: 2 };
pub const TIMEZONE: EepromField = EepromField { address: "11", size: 1 };
pub const STATION_LIST: EepromField = EepromField { address: "19", size: 16 };
pub const SETUP_BITS: EepromField = EepromField { address: "2B", size: 1 };
pub const RAIN_SEASON_START: EepromField = EepromField { address: "2C", size: 1 };
pub const ARCHIVE_PERIOD: EepromField = EepromField { address: "2D", size: 1 };

const RAIN_COLLECTOR_MASK: u8 = 0x30;
const WIND_CUP_MASK: u8 = 0x08;

/// Settings packed into the setup bits byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupBits {
    pub rain_collector: RainCollector,
    pub wind_cup_size: WindCupSize,
}

impl SetupBits {
    pub fn decode(bits: u8) -> ParseResult<Self> {
        let rain_collector = match bits & RAIN_COLLECTOR_MASK {
            0x00 => RainCollector::Inch100th,
            0x10 => RainCollector::Millimeter02,
            0x20 => RainCollector::Millimeter01,
            other => return Err(ProtocolError::InvalidRainCollector(other)),
        };
        let wind_cup_size = if bits & WIND_CUP_MASK == 0 {
            WindCupSize::Small
        } else {
            WindCupSize::Large
        };

        Ok(Self {
            rain_collector,
            wind_cup_size,
        })
    }
}

/// Decode the 16-byte station list: two bytes per transmitter id, the low
/// nibble of the first byte holding the station type.
pub fn decode_station_list(bytes: &[u8]) -> ParseResult<Vec<SensorStation>> {
    check_length(bytes, STATION_LIST.size)?;

    let stations = bytes[..STATION_LIST.size]
        .chunks_exact(2)
        .zip(1u8..)
        .filter_map(|(entry, index)| {
            StationType::from_code(entry[0] & 0x0F).map(|kind| SensorStation::new(kind, index))
        })
        .collect();

    Ok(stations)
}

/// Latitude or longitude, stored in tenths of a degree.
pub fn decode_coordinate(bytes: &[u8]) -> ParseResult<f64> {
    check_length(bytes, 2)?;
    Ok(f64::from(read_i16(bytes, 0)) / 10.0)
}

/// Elevation in feet.
pub fn decode_elevation(bytes: &[u8]) -> ParseResult<i16> {
    check_length(bytes, 2)?;
    Ok(read_i16(bytes, 0))
}
