pub mod log;
pub mod memory;

use jiff::civil::DateTime;
use serde::Serialize;
use vantage_core::{ArchiveRecord, CurrentWeather, Parameters, Sensor, SensorStation};

/// A message for the downstream consumer.
///
/// How a message is rendered and transported is up to the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Sensors the console reports values for.
    Sensors { sensors: Vec<Sensor> },
    /// The wireless transmitters the console listens to.
    SensorStations { stations: Vec<SensorStation> },
    /// Battery and reception of the transmitters at `time`.
    SensorStationStatus {
        time: DateTime,
        stations: Vec<SensorStation>,
    },
    Parameters { parameters: Parameters },
    CurrentWeather { weather: Box<CurrentWeather> },
    Archive { record: Box<ArchiveRecord> },
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Sensors { .. } => "sensors",
            Message::SensorStations { .. } => "sensor_stations",
            Message::SensorStationStatus { .. } => "sensor_station_status",
            Message::Parameters { .. } => "parameters",
            Message::CurrentWeather { .. } => "current_weather",
            Message::Archive { .. } => "archive",
        }
    }
}

/// Downstream consumer of station data.
pub trait Sink: Send + 'static {
    /// Error type specific to this sink implementation
    type Error: std::error::Error + Send + Sync + 'static;

    /// Whether messages can be delivered right now.
    fn is_connected(&self) -> bool;

    /// True exactly once after each (re)connection.
    fn take_reconnected(&self) -> bool;

    /// Timestamp of the newest archive record the consumer already holds.
    fn newest_record_time(&self) -> Option<DateTime>;

    fn send(&self, message: &Message) -> Result<(), Self::Error>;

    fn disconnect(&self);
}
