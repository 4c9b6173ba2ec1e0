use jiff::SignedDuration;
use jiff::civil::{Date, DateTime, Time, date};
use serde::{Deserialize, Serialize};

use super::{
    ARCHIVE_RECORD_SIZE, ParseResult, ProtocolError, RECORDS_PER_PAGE, check_length, read_i16,
};
use crate::{BoxList, RainCollector, units};

pub const LEAF_TEMPERATURES: usize = 2;
pub const LEAF_WETNESSES: usize = 2;
pub const SOIL_TEMPERATURES: usize = 3;
pub const EXTRA_HUMIDITIES: usize = 2;
pub const EXTRA_TEMPERATURES: usize = 3;
pub const SOIL_MOISTURES: usize = 4;

const UNKNOWN_TEMPERATURE: i16 = 32767;
const UNKNOWN_HIGH_TEMPERATURE: i16 = -32768;
const UNKNOWN_SOLAR_RADIATION: i16 = 32767;
const UNKNOWN_BYTE: u8 = 255;
const UNKNOWN_PRESSURE: i16 = 0;
const UNKNOWN_ET: u8 = 0;

const DEGREES_PER_SLICE: f64 = 22.5;
const EXTRA_TEMPERATURE_OFFSET: f64 = 90.0;

/// The packed archive date cannot express anything earlier.
pub const EARLIEST_RECORD_TIME: DateTime = date(2000, 1, 1).at(0, 0, 0, 0);
/// Seven bits of year offset.
const LATEST_RECORD_YEAR: i16 = 2127;

/// Records younger than this carry the live LOOP2 gust instead of their own high wind.
const GUST_OVERRIDE_AGE: SignedDuration = SignedDuration::from_mins(10);

/// A wind gust: speed in m/s, direction in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gust {
    pub speed: f64,
    pub direction: Option<f64>,
}

/// Everything besides the record bytes needed to decode an archive record.
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext {
    pub rain: RainCollector,
    /// Archive period in minutes.
    pub archive_period: u8,
    /// The most recent LOOP2 10-minute gust, once one was read.
    pub recent_gust: Option<Gust>,
    /// Current console-local time.
    pub now: DateTime,
}

/// One historical archive interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    /// End of the interval, console local time.
    pub time: DateTime,
    pub duration_secs: u32,
    pub avg_outside_temperature: Option<f64>,
    pub high_outside_temperature: Option<f64>,
    pub low_outside_temperature: Option<f64>,
    pub rainfall: f64,
    pub high_rain_rate: f64,
    pub barometer: Option<f64>,
    pub avg_solar_radiation: Option<i16>,
    pub high_solar_radiation: Option<i16>,
    /// Number of wind samples the console received during the interval.
    pub wind_sample_count: u16,
    pub inside_temperature: Option<f64>,
    pub inside_humidity: Option<u8>,
    pub outside_humidity: Option<u8>,
    pub avg_wind_speed: Option<f64>,
    pub prevailing_wind_direction: Option<f64>,
    pub high_wind_speed: Option<f64>,
    pub high_wind_direction: Option<f64>,
    pub gust: Option<Gust>,
    pub avg_uv_index: Option<f64>,
    pub high_uv_index: Option<f64>,
    pub evapotranspiration: Option<f64>,
    pub leaf_temperatures: [Option<f64>; LEAF_TEMPERATURES],
    pub leaf_wetnesses: [Option<u8>; LEAF_WETNESSES],
    pub soil_temperatures: [Option<f64>; SOIL_TEMPERATURES],
    pub extra_humidities: [Option<u8>; EXTRA_HUMIDITIES],
    pub extra_temperatures: [Option<f64>; EXTRA_TEMPERATURES],
    pub soil_moistures: [Option<u8>; SOIL_MOISTURES],
    /// The undecoded record, as persisted.
    #[serde(skip)]
    pub raw: BoxList<u8>,
}

impl ArchiveRecord {
    pub fn decode(bytes: &[u8], ctx: &DecodeContext) -> ParseResult<Self> {
        check_length(bytes, ARCHIVE_RECORD_SIZE)?;
        let bytes = &bytes[..ARCHIVE_RECORD_SIZE];

        let time = record_time(bytes)?;

        let high_wind_speed = wind_speed(bytes[25]);
        let high_wind_direction = direction(bytes[26]);

        let recent_gust = ctx
            .recent_gust
            .filter(|_| ctx.now.duration_since(time) < GUST_OVERRIDE_AGE);
        let gust = recent_gust.or_else(|| {
            high_wind_speed.map(|speed| Gust {
                speed,
                direction: high_wind_direction,
            })
        });

        Ok(Self {
            time,
            duration_secs: u32::from(ctx.archive_period) * 60,
            avg_outside_temperature: temperature(read_i16(bytes, 4), UNKNOWN_TEMPERATURE),
            high_outside_temperature: temperature(read_i16(bytes, 6), UNKNOWN_HIGH_TEMPERATURE),
            low_outside_temperature: temperature(read_i16(bytes, 8), UNKNOWN_TEMPERATURE),
            rainfall: ctx.rain.tips_to_mm(read_i16(bytes, 10)),
            high_rain_rate: ctx.rain.tips_to_mm(read_i16(bytes, 12)),
            barometer: Some(read_i16(bytes, 14))
                .filter(|&v| v != UNKNOWN_PRESSURE)
                .map(|v| units::inhg_to_hpa(f64::from(v) / 1000.0)),
            avg_solar_radiation: Some(read_i16(bytes, 16))
                .filter(|&v| v != UNKNOWN_SOLAR_RADIATION),
            high_solar_radiation: Some(read_i16(bytes, 30))
                .filter(|&v| v != UNKNOWN_SOLAR_RADIATION),
            wind_sample_count: wind_sample_count(bytes),
            inside_temperature: temperature(read_i16(bytes, 20), UNKNOWN_TEMPERATURE),
            inside_humidity: known(bytes[22]),
            outside_humidity: known(bytes[23]),
            avg_wind_speed: wind_speed(bytes[24]),
            prevailing_wind_direction: direction(bytes[27]),
            high_wind_speed,
            high_wind_direction,
            gust,
            avg_uv_index: known(bytes[28]).map(|v| f64::from(v) / 10.0),
            high_uv_index: known(bytes[32]).map(|v| f64::from(v) / 10.0),
            evapotranspiration: Some(bytes[29])
                .filter(|&v| v != UNKNOWN_ET)
                .map(|v| units::inches_to_mm(f64::from(v) / 1000.0)),
            leaf_temperatures: std::array::from_fn(|i| extra_temperature(bytes[34 + i])),
            leaf_wetnesses: std::array::from_fn(|i| known(bytes[36 + i])),
            soil_temperatures: std::array::from_fn(|i| extra_temperature(bytes[38 + i])),
            extra_humidities: std::array::from_fn(|i| known(bytes[43 + i])),
            extra_temperatures: std::array::from_fn(|i| extra_temperature(bytes[45 + i])),
            soil_moistures: std::array::from_fn(|i| known(bytes[48 + i])),
            raw: bytes.into(),
        })
    }

    /// Whether the record is younger than `max_age` at `now`.
    pub fn is_recent(&self, now: DateTime, max_age: SignedDuration) -> bool {
        now.duration_since(self.time) < max_age
    }
}

/// Decode the timestamp of a raw record without decoding the rest of it.
pub fn record_time(bytes: &[u8]) -> ParseResult<DateTime> {
    check_length(bytes, 4)?;
    unpack_datetime(read_i16(bytes, 0) as u16, read_i16(bytes, 2) as u16)
}

pub fn wind_sample_count(bytes: &[u8]) -> u16 {
    read_i16(bytes, 18) as u16
}

/// Unused archive slots are filled with 0xFF.
pub fn is_empty_record(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0xFF)
}

/// The record slots of an archive page, starting at `first_record`.
pub fn page_records(page: &[u8], first_record: usize) -> impl Iterator<Item = &[u8]> {
    (first_record..RECORDS_PER_PAGE).filter_map(move |i| {
        let start = 1 + i * ARCHIVE_RECORD_SIZE;
        page.get(start..start + ARCHIVE_RECORD_SIZE)
    })
}

/// Packed date: day in bits 0-4, month in bits 5-8, year - 2000 in bits 9-15.
pub fn pack_date(date: Date) -> ParseResult<u16> {
    let year = date.year();
    if !(EARLIEST_RECORD_TIME.year()..=LATEST_RECORD_YEAR).contains(&year) {
        return Err(ProtocolError::DateOutOfRange(year));
    }
    let offset = (year - EARLIEST_RECORD_TIME.year()) as u16;
    Ok(date.day() as u16 + date.month() as u16 * 32 + offset * 512)
}

/// Packed time: `hour * 100 + minute`.
pub fn pack_time(time: Time) -> u16 {
    time.hour() as u16 * 100 + time.minute() as u16
}

pub fn unpack_datetime(date: u16, time: u16) -> ParseResult<DateTime> {
    let year = ((date >> 9) & 0x3F) as i16 + 2000;
    let month = ((date >> 5) & 0xF) as i8;
    let day = (date & 0x1F) as i8;
    let hour = (time / 100) as i8;
    let minute = (time % 100) as i8;

    DateTime::new(year, month, day, hour, minute, 0, 0)
        .map_err(|_| ProtocolError::InvalidTimestamp { date, time })
}

fn known(value: u8) -> Option<u8> {
    (value != UNKNOWN_BYTE).then_some(value)
}

fn temperature(value: i16, unknown: i16) -> Option<f64> {
    (value != unknown).then(|| units::fahrenheit_to_celsius(f64::from(value) / 10.0))
}

fn extra_temperature(value: u8) -> Option<f64> {
    known(value).map(|v| units::fahrenheit_to_celsius(f64::from(v) - EXTRA_TEMPERATURE_OFFSET))
}

fn wind_speed(value: u8) -> Option<f64> {
    known(value).map(|v| units::mph_to_mps(f64::from(v)))
}

fn direction(slice: u8) -> Option<f64> {
    known(slice).map(|v| f64::from(v) * DEGREES_PER_SLICE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::put_i16;
    use jiff::civil::date;

    fn context(now: DateTime) -> DecodeContext {
        DecodeContext {
            rain: RainCollector::Inch100th,
            archive_period: 5,
            recent_gust: Some(Gust {
                speed: 7.5,
                direction: Some(90.0),
            }),
            now,
        }
    }

    fn record_at(at: DateTime) -> [u8; ARCHIVE_RECORD_SIZE] {
        let mut bytes = [0xFFu8; ARCHIVE_RECORD_SIZE];
        put_i16(&mut bytes, 0, pack_date(at.date()).unwrap() as i16);
        put_i16(&mut bytes, 2, pack_time(at.time()) as i16);
        put_i16(&mut bytes, 4, 725);
        put_i16(&mut bytes, 6, 801);
        put_i16(&mut bytes, 8, 650);
        put_i16(&mut bytes, 10, 3);
        put_i16(&mut bytes, 12, 40);
        put_i16(&mut bytes, 14, 30_012);
        put_i16(&mut bytes, 16, 412);
        put_i16(&mut bytes, 18, 110);
        put_i16(&mut bytes, 20, 688);
        bytes[22] = 38;
        bytes[23] = 71;
        bytes[24] = 6;
        bytes[25] = 19;
        bytes[26] = 4;
        bytes[27] = 3;
        bytes[28] = 35;
        bytes[29] = 8;
        put_i16(&mut bytes, 30, 655);
        bytes[32] = 51;
        bytes[45] = 140;
        bytes
    }

    #[test]
    fn date_and_time_unpack() {
        // year offset 0, month 1, day 1
        let packed = 1 + (1 << 5);
        assert_eq!(
            unpack_datetime(packed, 930).unwrap(),
            date(2000, 1, 1).at(9, 30, 0, 0)
        );
    }

    #[test]
    fn packing_matches_unpacking() {
        let at = date(2024, 11, 3).at(23, 55, 0, 0);
        let packed = pack_date(at.date()).unwrap();
        let unpacked = unpack_datetime(packed, pack_time(at.time())).unwrap();
        assert_eq!(unpacked, at);
        assert_eq!(packed, 3 + 11 * 32 + 24 * 512);
    }

    #[test]
    fn dates_outside_the_packed_range_are_rejected() {
        assert_eq!(
            pack_date(date(1999, 12, 31)),
            Err(ProtocolError::DateOutOfRange(1999))
        );
        assert_eq!(
            pack_date(date(2128, 1, 1)),
            Err(ProtocolError::DateOutOfRange(2128))
        );
        assert_eq!(pack_date(EARLIEST_RECORD_TIME.date()), Ok(1 + 32));
    }

    #[test]
    fn invalid_timestamp_is_an_error() {
        assert_eq!(
            unpack_datetime(0xFFFF, 0xFFFF),
            Err(ProtocolError::InvalidTimestamp {
                date: 0xFFFF,
                time: 0xFFFF
            })
        );
    }

    #[test]
    fn decodes_record_fields() {
        let at = date(2024, 6, 1).at(12, 0, 0, 0);
        let bytes = record_at(at);
        let record = ArchiveRecord::decode(&bytes, &context(at + SignedDuration::from_hours(2)))
            .unwrap();

        assert_eq!(record.time, at);
        assert_eq!(record.duration_secs, 300);
        assert!((record.avg_outside_temperature.unwrap() - 22.5).abs() < 1e-9);
        assert!((record.rainfall - 0.762).abs() < 1e-9);
        assert_eq!(record.wind_sample_count, 110);
        assert_eq!(record.inside_humidity, Some(38));
        assert_eq!(record.outside_humidity, Some(71));
        assert_eq!(record.prevailing_wind_direction, Some(67.5));
        assert_eq!(record.high_wind_direction, Some(90.0));
        assert_eq!(record.avg_uv_index, Some(3.5));
        assert_eq!(record.high_uv_index, Some(5.1));
        assert!((record.extra_temperatures[0].unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(record.raw.as_ref(), &bytes[..]);
    }

    #[test]
    fn sentinels_decode_to_absent() {
        let at = date(2024, 6, 1).at(12, 0, 0, 0);
        let mut bytes = record_at(at);
        put_i16(&mut bytes, 4, UNKNOWN_TEMPERATURE);
        put_i16(&mut bytes, 6, UNKNOWN_HIGH_TEMPERATURE);
        put_i16(&mut bytes, 8, UNKNOWN_TEMPERATURE);
        put_i16(&mut bytes, 14, UNKNOWN_PRESSURE);
        put_i16(&mut bytes, 16, UNKNOWN_SOLAR_RADIATION);
        bytes[22] = UNKNOWN_BYTE;
        bytes[24] = UNKNOWN_BYTE;
        bytes[27] = UNKNOWN_BYTE;
        bytes[29] = UNKNOWN_ET;

        let record = ArchiveRecord::decode(&bytes, &context(at)).unwrap();
        assert_eq!(record.avg_outside_temperature, None);
        assert_eq!(record.high_outside_temperature, None);
        assert_eq!(record.low_outside_temperature, None);
        assert_eq!(record.barometer, None);
        assert_eq!(record.avg_solar_radiation, None);
        assert_eq!(record.inside_humidity, None);
        assert_eq!(record.avg_wind_speed, None);
        assert_eq!(record.prevailing_wind_direction, None);
        assert_eq!(record.evapotranspiration, None);
        assert!(record.leaf_wetnesses.iter().all(Option::is_none));
        assert!(record.soil_moistures.iter().all(Option::is_none));
    }

    #[test]
    fn recent_record_uses_loop2_gust() {
        let at = date(2024, 6, 1).at(12, 0, 0, 0);
        let record =
            ArchiveRecord::decode(&record_at(at), &context(at + SignedDuration::from_mins(3)))
                .unwrap();
        assert_eq!(
            record.gust,
            Some(Gust {
                speed: 7.5,
                direction: Some(90.0)
            })
        );
    }

    #[test]
    fn calm_loop2_gust_is_kept() {
        let at = date(2024, 6, 1).at(12, 0, 0, 0);
        let mut ctx = context(at + SignedDuration::from_mins(3));
        ctx.recent_gust = Some(Gust {
            speed: 0.0,
            direction: Some(0.0),
        });

        let record = ArchiveRecord::decode(&record_at(at), &ctx).unwrap();
        assert_eq!(
            record.gust,
            Some(Gust {
                speed: 0.0,
                direction: Some(0.0)
            })
        );
    }

    #[test]
    fn recent_record_without_loop2_uses_its_high_wind() {
        let at = date(2024, 6, 1).at(12, 0, 0, 0);
        let mut ctx = context(at + SignedDuration::from_mins(3));
        ctx.recent_gust = None;

        let record = ArchiveRecord::decode(&record_at(at), &ctx).unwrap();
        let gust = record.gust.unwrap();
        assert!((gust.speed - units::mph_to_mps(19.0)).abs() < 1e-9);
    }

    #[test]
    fn old_record_uses_its_high_wind() {
        let at = date(2024, 6, 1).at(12, 0, 0, 0);
        let record =
            ArchiveRecord::decode(&record_at(at), &context(at + SignedDuration::from_mins(10)))
                .unwrap();
        let gust = record.gust.unwrap();
        assert!((gust.speed - units::mph_to_mps(19.0)).abs() < 1e-9);
        assert_eq!(gust.direction, Some(90.0));
    }

    #[test]
    fn empty_slots_are_detected() {
        assert!(is_empty_record(&[0xFF; ARCHIVE_RECORD_SIZE]));
        let at = date(2024, 6, 1).at(12, 0, 0, 0);
        assert!(!is_empty_record(&record_at(at)));
    }

    #[test]
    fn page_records_honours_first_record() {
        let mut page = vec![0u8; super::super::ARCHIVE_PAGE_SIZE];
        for i in 0..RECORDS_PER_PAGE {
            page[1 + i * ARCHIVE_RECORD_SIZE] = i as u8;
        }
        let firsts: Vec<u8> = page_records(&page, 2).map(|r| r[0]).collect();
        assert_eq!(firsts, vec![2, 3, 4]);
    }
}
