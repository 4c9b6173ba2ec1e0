use jiff::civil::{Date, Time};
use serde::{Deserialize, Serialize};

use super::{
    LOOP_MAGIC, LOOP_PACKET_SIZE, LOOP_PACKET_TYPE, ParseResult, ProtocolError, check_length,
    check_trailer, crc, read_i16,
};
use crate::{RainCollector, units};

// packet structure : "LOO"(3) + trend(1) + type(1) + fields(90) + <LF><CR>(2) + crc(2)

pub const EXTRA_TEMPERATURES: usize = 7;
pub const SOIL_TEMPERATURES: usize = 4;
pub const LEAF_TEMPERATURES: usize = 3;
pub const EXTRA_HUMIDITIES: usize = 7;
pub const SOIL_MOISTURES: usize = 4;
pub const LEAF_WETNESSES: usize = 3;

const INVALID_BYTE: u8 = 255;
/// Trend byte sent while the console has not collected enough readings.
const UNKNOWN_TREND: u8 = 255;
const INVALID_WORD: i16 = 32767;
const EXTRA_TEMPERATURE_OFFSET: f64 = 90.0;
const TEMPERATURE_SCALE: f64 = 10.0;

/// Barometric trend reported in byte 3 of a LOOP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaroTrend {
    FallingRapidly,
    FallingSlowly,
    Steady,
    RisingSlowly,
    RisingRapidly,
}

impl TryFrom<u8> for BaroTrend {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            196 => Ok(BaroTrend::FallingRapidly),
            236 => Ok(BaroTrend::FallingSlowly),
            0 => Ok(BaroTrend::Steady),
            20 => Ok(BaroTrend::RisingSlowly),
            60 => Ok(BaroTrend::RisingRapidly),
            _ => Err(ProtocolError::InvalidBaroTrend(value)),
        }
    }
}

/// Forecast icon shown on the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Forecast {
    Sunny,
    PartlyCloudy,
    MostlyCloudy,
    MostlyCloudyWithRain,
    MostlyCloudyWithSnow,
    MostlyCloudyWithRainOrSnow,
    PartlyCloudyWithRainLater,
    PartlyCloudyWithSnowLater,
    PartlyCloudyWithRainOrSnowLater,
}

impl Forecast {
    pub fn from_icon(icon: u8) -> Option<Self> {
        match icon {
            8 => Some(Forecast::Sunny),
            6 => Some(Forecast::PartlyCloudy),
            2 => Some(Forecast::MostlyCloudy),
            3 => Some(Forecast::MostlyCloudyWithRain),
            18 => Some(Forecast::MostlyCloudyWithSnow),
            19 => Some(Forecast::MostlyCloudyWithRainOrSnow),
            7 => Some(Forecast::PartlyCloudyWithRainLater),
            22 => Some(Forecast::PartlyCloudyWithSnowLater),
            23 => Some(Forecast::PartlyCloudyWithRainOrSnowLater),
            _ => None,
        }
    }
}

/// A decoded LOOP packet. Temperatures are in °C, rain and ET in mm,
/// wind speeds in m/s and pressure in hPa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopRecord {
    /// `None` for rev A firmware, which sends `P` instead of a trend, and
    /// while the console does not know the trend yet.
    pub baro_trend: Option<BaroTrend>,
    /// Archive slot the console will write next.
    pub next_record: u16,
    pub barometer: Option<f64>,
    pub inside_temperature: Option<f64>,
    pub inside_humidity: Option<u8>,
    pub outside_temperature: Option<f64>,
    pub outside_humidity: Option<u8>,
    pub wind_speed: Option<f64>,
    pub wind_speed_10min_avg: Option<f64>,
    /// Degrees, 0 is north.
    pub wind_direction: u16,
    pub extra_temperatures: [Option<f64>; EXTRA_TEMPERATURES],
    pub soil_temperatures: [Option<f64>; SOIL_TEMPERATURES],
    pub leaf_temperatures: [Option<f64>; LEAF_TEMPERATURES],
    pub extra_humidities: [Option<u8>; EXTRA_HUMIDITIES],
    pub rain_rate: f64,
    pub uv_index: Option<u8>,
    /// W/m².
    pub solar_radiation: Option<i16>,
    pub storm_rain: f64,
    pub storm_start: Option<Date>,
    pub day_rain: f64,
    pub month_rain: f64,
    pub year_rain: f64,
    pub day_et: f64,
    pub month_et: f64,
    pub year_et: f64,
    pub soil_moistures: [Option<u8>; SOIL_MOISTURES],
    pub leaf_wetnesses: [Option<u8>; LEAF_WETNESSES],
    /// One bit per transmitter, set when its battery is low.
    pub transmitter_battery_status: u8,
    /// Volts.
    pub console_battery_voltage: f64,
    pub forecast: Option<Forecast>,
    pub forecast_rule: u8,
    pub sunrise: Option<Time>,
    pub sunset: Option<Time>,
}

impl LoopRecord {
    pub fn decode(bytes: &[u8], rain: RainCollector) -> ParseResult<Self> {
        check_length(bytes, LOOP_PACKET_SIZE)?;

        if &bytes[..3] != LOOP_MAGIC {
            return Err(ProtocolError::InvalidMagic([bytes[0], bytes[1], bytes[2]]));
        }

        let baro_trend = match bytes[3] {
            b'P' | UNKNOWN_TREND => None,
            trend => Some(BaroTrend::try_from(trend)?),
        };

        if bytes[4] != LOOP_PACKET_TYPE {
            return Err(ProtocolError::InvalidPacketType(bytes[4]));
        }

        check_trailer(bytes)?;
        crc::check(bytes, LOOP_PACKET_SIZE - 2)?;

        Ok(Self {
            baro_trend,
            next_record: read_i16(bytes, 5) as u16,
            barometer: pressure(read_i16(bytes, 7)),
            inside_temperature: scaled_temperature(read_i16(bytes, 9)),
            inside_humidity: valid_byte(bytes[11]),
            outside_temperature: scaled_temperature(read_i16(bytes, 12)),
            outside_humidity: valid_byte(bytes[33]),
            wind_speed: valid_byte(bytes[14]).map(|v| units::mph_to_mps(f64::from(v))),
            wind_speed_10min_avg: valid_byte(bytes[15]).map(|v| units::mph_to_mps(f64::from(v))),
            wind_direction: heading(read_i16(bytes, 16)),
            extra_temperatures: std::array::from_fn(|i| extra_temperature(bytes[18 + i])),
            soil_temperatures: std::array::from_fn(|i| extra_temperature(bytes[25 + i])),
            leaf_temperatures: std::array::from_fn(|i| extra_temperature(bytes[29 + i])),
            extra_humidities: std::array::from_fn(|i| valid_byte(bytes[34 + i])),
            rain_rate: hundredths_of_inch(read_i16(bytes, 41)),
            uv_index: valid_byte(bytes[43]),
            solar_radiation: Some(read_i16(bytes, 44)).filter(|&v| v != INVALID_WORD),
            storm_rain: hundredths_of_inch(read_i16(bytes, 46)),
            storm_start: storm_date(read_i16(bytes, 48)),
            day_rain: rain.tips_to_mm(read_i16(bytes, 50)),
            month_rain: rain.tips_to_mm(read_i16(bytes, 52)),
            year_rain: rain.tips_to_mm(read_i16(bytes, 54)),
            day_et: units::inches_to_mm(f64::from(read_i16(bytes, 56)) / 1000.0),
            month_et: hundredths_of_inch(read_i16(bytes, 58)),
            year_et: hundredths_of_inch(read_i16(bytes, 60)),
            soil_moistures: std::array::from_fn(|i| valid_byte(bytes[62 + i])),
            leaf_wetnesses: std::array::from_fn(|i| valid_byte(bytes[66 + i])),
            transmitter_battery_status: bytes[86],
            console_battery_voltage: f64::from((i32::from(read_i16(bytes, 87)) * 300) / 512)
                / 100.0,
            forecast: Forecast::from_icon(bytes[89]),
            forecast_rule: bytes[90],
            sunrise: clock_time(read_i16(bytes, 91)),
            sunset: clock_time(read_i16(bytes, 93)),
        })
    }

    /// Whether the transmitter at the 1-based `index` reports a good battery.
    pub fn transmitter_battery_good(&self, index: u8) -> bool {
        match index {
            1..=8 => self.transmitter_battery_status & (1 << (index - 1)) == 0,
            _ => true,
        }
    }

    pub fn storm_ongoing(&self) -> bool {
        self.storm_start.is_some() && self.storm_rain > 0.0
    }
}

fn valid_byte(value: u8) -> Option<u8> {
    (value != INVALID_BYTE).then_some(value)
}

fn extra_temperature(value: u8) -> Option<f64> {
    valid_byte(value)
        .map(|v| units::fahrenheit_to_celsius(f64::from(v) - EXTRA_TEMPERATURE_OFFSET))
}

fn scaled_temperature(value: i16) -> Option<f64> {
    (value != INVALID_WORD)
        .then(|| units::fahrenheit_to_celsius(f64::from(value) / TEMPERATURE_SCALE))
}

fn hundredths_of_inch(value: i16) -> f64 {
    units::inches_to_mm(f64::from(value) / 100.0)
}

pub(crate) fn pressure(value: i16) -> Option<f64> {
    (value != 0).then(|| units::inhg_to_hpa(f64::from(value) / 1000.0))
}

pub(crate) fn heading(value: i16) -> u16 {
    if value == 360 { 0 } else { value as u16 }
}

/// Storm start date: month in bits 12-15, day in bits 7-11, year - 2000 in the low bits.
fn storm_date(value: i16) -> Option<Date> {
    if value == -1 {
        return None;
    }
    let raw = value as u16;
    let year = (raw & 0x3F) as i16 + 2000;
    let day = ((raw >> 7) & 0x1F) as i8;
    let month = ((raw >> 12) & 0xF) as i8;
    Date::new(year, month, day).ok()
}

fn clock_time(hhmm: i16) -> Option<Time> {
    if hhmm < 0 {
        return None;
    }
    Time::new((hhmm / 100) as i8, (hhmm % 100) as i8, 0, 0).ok()
}
