pub mod protocol;
pub mod sensor;
pub mod station;
pub mod units;
pub mod weather;
pub mod wind;

use serde::{Deserialize, Serialize};

pub use protocol::archive::{ArchiveRecord, DecodeContext, Gust};
pub use protocol::error::{ParseResult, ProtocolError};
pub use protocol::loop2_packet::Loop2Record;
pub use protocol::loop_packet::{BaroTrend, Forecast, LoopRecord};
pub use sensor::{Sensor, SensorId, SensorKind};
pub use station::{SensorStation, StationType};
pub use weather::{CurrentWeather, Parameters};
pub use wind::WindHeadingHistogram;

// We use `Box<str>` and `Box<[T]>` for values that never grow after decode.
pub(crate) type BoxStr = Box<str>;
pub(crate) type BoxList<T> = Box<[T]>;

/// Percentage value in the range 0–100 (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Percentage(pub u8);

impl Percentage {
    /// Build a percentage from a ratio, clamping at 100.
    pub fn from_ratio(actual: u32, expected: u32) -> Self {
        if expected == 0 {
            return Percentage(0);
        }
        let value = (u64::from(actual) * 100 / u64::from(expected)).min(100);
        Percentage(value as u8)
    }
}

/// Size of one rain collector bucket tip.
///
/// Every rain counter the console reports is a number of tips, so this value
/// must be known before any rain field can be scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RainCollector {
    /// 0.01 inch per tip.
    Inch100th,
    /// 0.2 mm per tip.
    Millimeter02,
    /// 0.1 mm per tip.
    Millimeter01,
}

impl RainCollector {
    /// Rain per bucket tip in inches.
    pub fn inches_per_tip(self) -> f64 {
        match self {
            RainCollector::Inch100th => 0.01,
            RainCollector::Millimeter02 => 0.007874,
            RainCollector::Millimeter01 => 0.003937,
        }
    }

    /// Convert a tip count into millimeters.
    pub fn tips_to_mm(self, tips: i16) -> f64 {
        units::inches_to_mm(f64::from(tips) * self.inches_per_tip())
    }
}

/// Anemometer cup size from the console setup bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindCupSize {
    Small,
    Large,
}
