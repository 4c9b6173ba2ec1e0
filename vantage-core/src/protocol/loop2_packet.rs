use serde::{Deserialize, Serialize};

use super::loop_packet::{heading, pressure};
use super::{
    LOOP_MAGIC, LOOP_PACKET_SIZE, LOOP2_PACKET_TYPE, ParseResult, ProtocolError, check_length,
    check_trailer, crc, read_i16,
};
use crate::{RainCollector, units};

const INVALID_WORD: i16 = 32767;

// Offsets within the LOOP2 frame.
const WIND_SPEED_2MIN_AVG: usize = 20;
const WIND_GUST_10MIN: usize = 22;
const WIND_GUST_DIRECTION_10MIN: usize = 24;
const DEW_POINT: usize = 30;
const HEAT_INDEX: usize = 35;
const WIND_CHILL: usize = 37;
// Shares its offset with the wind chill.
const THSW: usize = 37;
const RAIN_15MIN: usize = 52;
const RAIN_HOUR: usize = 54;
const RAIN_24HOUR: usize = 58;
const ATM_PRESSURE: usize = 65;

/// A decoded LOOP2 packet, in the same units as [`crate::LoopRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loop2Record {
    pub wind_speed_2min_avg: f64,
    pub wind_gust_10min: f64,
    pub wind_gust_direction_10min: u16,
    pub dew_point: Option<f64>,
    pub heat_index: Option<f64>,
    pub wind_chill: Option<f64>,
    pub thsw: Option<f64>,
    pub rain_15min: f64,
    pub rain_hour: f64,
    pub rain_24hour: f64,
    pub atm_pressure: Option<f64>,
}

impl Loop2Record {
    pub fn decode(bytes: &[u8], rain: RainCollector) -> ParseResult<Self> {
        check_length(bytes, LOOP_PACKET_SIZE)?;

        if &bytes[..3] != LOOP_MAGIC {
            return Err(ProtocolError::InvalidMagic([bytes[0], bytes[1], bytes[2]]));
        }

        if bytes[4] != LOOP2_PACKET_TYPE {
            return Err(ProtocolError::InvalidPacketType(bytes[4]));
        }

        check_trailer(bytes)?;
        crc::check(bytes, LOOP_PACKET_SIZE - 2)?;

        Ok(Self {
            wind_speed_2min_avg: units::mph_to_mps(
                f64::from(read_i16(bytes, WIND_SPEED_2MIN_AVG)) / 10.0,
            ),
            wind_gust_10min: units::mph_to_mps(f64::from(read_i16(bytes, WIND_GUST_10MIN))),
            wind_gust_direction_10min: heading(read_i16(bytes, WIND_GUST_DIRECTION_10MIN)),
            dew_point: whole_degrees(read_i16(bytes, DEW_POINT)),
            heat_index: whole_degrees(read_i16(bytes, HEAT_INDEX)),
            wind_chill: whole_degrees(read_i16(bytes, WIND_CHILL)),
            thsw: whole_degrees(read_i16(bytes, THSW)),
            rain_15min: rain.tips_to_mm(read_i16(bytes, RAIN_15MIN)),
            rain_hour: rain.tips_to_mm(read_i16(bytes, RAIN_HOUR)),
            rain_24hour: rain.tips_to_mm(read_i16(bytes, RAIN_24HOUR)),
            atm_pressure: pressure(read_i16(bytes, ATM_PRESSURE)),
        })
    }
}

fn whole_degrees(fahrenheit: i16) -> Option<f64> {
    (fahrenheit != INVALID_WORD).then(|| units::fahrenheit_to_celsius(f64::from(fahrenheit)))
}
