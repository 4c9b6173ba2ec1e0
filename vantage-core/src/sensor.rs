use serde::{Deserialize, Serialize};

use crate::LoopRecord;

/// Stable numeric identifier of a sensor, shared with the downstream collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorId(pub u16);

impl SensorId {
    pub const BAROMETER: SensorId = SensorId(1);
    pub const WIND: SensorId = SensorId(2);
    pub const UV: SensorId = SensorId(3);
    pub const SOLAR_RADIATION: SensorId = SensorId(4);
    pub const RAIN_COLLECTOR: SensorId = SensorId(5);
    pub const INDOOR_THERMOMETER: SensorId = SensorId(6);
    pub const OUTDOOR_THERMOMETER: SensorId = SensorId(7);
    pub const INDOOR_HYGROMETER: SensorId = SensorId(8);
    pub const OUTDOOR_HYGROMETER: SensorId = SensorId(9);

    const THERMOMETER_BASE: u16 = 100;
    const HYGROMETER_BASE: u16 = 200;
    const LEAF_WETNESS_BASE: u16 = 400;
    const LEAF_TEMPERATURE_BASE: u16 = 500;
    const SOIL_MOISTURE_BASE: u16 = 600;
    const SOIL_TEMPERATURE_BASE: u16 = 700;

    pub fn extra_thermometer(channel: usize) -> Self {
        SensorId(Self::THERMOMETER_BASE + channel as u16)
    }

    pub fn extra_hygrometer(channel: usize) -> Self {
        SensorId(Self::HYGROMETER_BASE + channel as u16)
    }

    pub fn leaf_wetness(channel: usize) -> Self {
        SensorId(Self::LEAF_WETNESS_BASE + channel as u16)
    }

    pub fn leaf_temperature(channel: usize) -> Self {
        SensorId(Self::LEAF_TEMPERATURE_BASE + channel as u16)
    }

    pub fn soil_moisture(channel: usize) -> Self {
        SensorId(Self::SOIL_MOISTURE_BASE + channel as u16)
    }

    pub fn soil_temperature(channel: usize) -> Self {
        SensorId(Self::SOIL_TEMPERATURE_BASE + channel as u16)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    Thermometer,
    Ultraviolet,
    Anemometer,
    LeafWetness,
    LeafTemperature,
    SolarRadiation,
    SoilMoisture,
    SoilTemperature,
    Hygrometer,
    RainCollector,
    Barometer,
}

/// A measurement capability of the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sensor {
    pub id: SensorId,
    pub kind: SensorKind,
}

impl Sensor {
    pub fn new(kind: SensorKind, id: SensorId) -> Self {
        Self { id, kind }
    }
}

/// Work out which sensors are attached from the values present in a LOOP packet.
///
/// The base sensors every console has are always reported.
pub fn detect_sensors(record: &LoopRecord) -> Vec<Sensor> {
    let mut sensors = vec![
        Sensor::new(SensorKind::Barometer, SensorId::BAROMETER),
        Sensor::new(SensorKind::Anemometer, SensorId::WIND),
        Sensor::new(SensorKind::RainCollector, SensorId::RAIN_COLLECTOR),
        Sensor::new(SensorKind::Thermometer, SensorId::INDOOR_THERMOMETER),
        Sensor::new(SensorKind::Thermometer, SensorId::OUTDOOR_THERMOMETER),
        Sensor::new(SensorKind::Hygrometer, SensorId::INDOOR_HYGROMETER),
        Sensor::new(SensorKind::Hygrometer, SensorId::OUTDOOR_HYGROMETER),
    ];

    if record.uv_index.is_some() {
        sensors.push(Sensor::new(SensorKind::Ultraviolet, SensorId::UV));
    }

    if record.solar_radiation.is_some() {
        sensors.push(Sensor::new(
            SensorKind::SolarRadiation,
            SensorId::SOLAR_RADIATION,
        ));
    }

    push_present(
        &mut sensors,
        &record.extra_humidities,
        SensorKind::Hygrometer,
        SensorId::extra_hygrometer,
    );
    push_present(
        &mut sensors,
        &record.extra_temperatures,
        SensorKind::Thermometer,
        SensorId::extra_thermometer,
    );
    push_present(
        &mut sensors,
        &record.leaf_wetnesses,
        SensorKind::LeafWetness,
        SensorId::leaf_wetness,
    );
    push_present(
        &mut sensors,
        &record.soil_moistures,
        SensorKind::SoilMoisture,
        SensorId::soil_moisture,
    );
    push_present(
        &mut sensors,
        &record.soil_temperatures,
        SensorKind::SoilTemperature,
        SensorId::soil_temperature,
    );
    push_present(
        &mut sensors,
        &record.leaf_temperatures,
        SensorKind::LeafTemperature,
        SensorId::leaf_temperature,
    );

    sensors
}

fn push_present<T>(
    sensors: &mut Vec<Sensor>,
    channels: &[Option<T>],
    kind: SensorKind,
    id: fn(usize) -> SensorId,
) {
    sensors.extend(
        channels
            .iter()
            .enumerate()
            .filter(|(_, value)| value.is_some())
            .map(|(channel, _)| Sensor::new(kind, id(channel))),
    );
}
