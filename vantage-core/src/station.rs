use serde::{Deserialize, Serialize};

use crate::{LoopRecord, Percentage};

/// Interval between two ISS transmissions, in sixteenths of a second.
const ISS_TRANSMIT_INTERVAL_16THS: u32 = 41;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StationType {
    IntegratedSensorStation,
    TemperatureOnly,
    HumidityOnly,
    TemperatureHumidity,
    Anemometer,
    Rain,
    Leaf,
    Soil,
    SoilLeaf,
}

impl StationType {
    /// Map the station list code; `None` for an unused transmitter slot.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(StationType::IntegratedSensorStation),
            1 => Some(StationType::TemperatureOnly),
            2 => Some(StationType::HumidityOnly),
            3 => Some(StationType::TemperatureHumidity),
            4 => Some(StationType::Anemometer),
            5 => Some(StationType::Rain),
            6 => Some(StationType::Leaf),
            7 => Some(StationType::Soil),
            8 => Some(StationType::SoilLeaf),
            _ => None,
        }
    }
}

/// A wireless transmitter the console listens to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorStation {
    pub kind: StationType,
    /// Transmitter id, 1-based.
    pub index: u8,
    pub battery_good: bool,
    /// Reception quality; only tracked for the integrated sensor station.
    pub link_quality: Percentage,
}

impl SensorStation {
    pub fn new(kind: StationType, index: u8) -> Self {
        Self {
            kind,
            index,
            battery_good: true,
            link_quality: Percentage(100),
        }
    }

    pub fn is_integrated(&self) -> bool {
        self.kind == StationType::IntegratedSensorStation
    }
}

/// Refresh every station's battery flag from a LOOP packet.
pub fn update_batteries(stations: &mut [SensorStation], record: &LoopRecord) {
    for station in stations {
        station.battery_good = record.transmitter_battery_good(station.index);
    }
}

/// Set the link quality of the integrated sensor stations.
pub fn update_link_quality(stations: &mut [SensorStation], quality: Percentage) {
    for station in stations.iter_mut().filter(|s| s.is_integrated()) {
        station.link_quality = quality;
    }
}

/// Number of wind samples an ISS delivers in one archive period.
pub fn expected_wind_samples(archive_period_minutes: u8) -> u32 {
    u32::from(archive_period_minutes) * 60 * 16 / ISS_TRANSMIT_INTERVAL_16THS
}

/// ISS reception for one archive interval, from the number of wind samples received.
pub fn iss_reception(wind_samples: u16, archive_period_minutes: u8) -> Percentage {
    Percentage::from_ratio(
        u32::from(wind_samples),
        expected_wind_samples(archive_period_minutes),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_samples_for_common_periods() {
        assert_eq!(expected_wind_samples(5), 117);
        assert_eq!(expected_wind_samples(30), 702);
    }

    #[test]
    fn reception_is_capped() {
        assert_eq!(iss_reception(117, 5), Percentage(100));
        assert_eq!(iss_reception(140, 5), Percentage(100));
        assert_eq!(iss_reception(58, 5), Percentage(49));
        assert_eq!(iss_reception(0, 5), Percentage(0));
    }

    #[test]
    fn link_quality_only_for_iss() {
        let mut stations = vec![
            SensorStation::new(StationType::IntegratedSensorStation, 1),
            SensorStation::new(StationType::Leaf, 2),
        ];
        update_link_quality(&mut stations, Percentage(80));
        assert_eq!(stations[0].link_quality, Percentage(80));
        assert_eq!(stations[1].link_quality, Percentage(100));
    }
}
