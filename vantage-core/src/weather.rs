use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::{BoxList, BoxStr, Loop2Record, LoopRecord, RainCollector, WindCupSize};

pub const MANUFACTURER: &str = "Davis Instruments";
pub const MODEL: &str = "Vantage Pro 2";

/// A LOOP/LOOP2 pair read in one cycle of the current weather loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub time: Timestamp,
    pub conditions: LoopRecord,
    pub extended: Loop2Record,
    /// Dominant wind directions of the past hour, most frequent first.
    pub dominant_headings: BoxList<f64>,
}

impl CurrentWeather {
    pub fn next_record(&self) -> u16 {
        self.conditions.next_record
    }
}

/// Station description sent once per connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    pub manufacturer: BoxStr,
    pub model: BoxStr,
    pub firmware_date: BoxStr,
    pub firmware_version: BoxStr,
    /// Degrees, north positive.
    pub latitude: f64,
    /// Degrees, east positive.
    pub longitude: f64,
    pub elevation_mm: f64,
    /// Month the rain year starts in.
    pub rain_season_start: u8,
    /// Minutes.
    pub archive_period: u8,
    pub wind_cup_size: WindCupSize,
    pub rain_collector: RainCollector,
}
