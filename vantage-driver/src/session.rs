use std::thread;

use jiff::civil::DateTime;
use jiff::{SignedDuration, Timestamp, Zoned};
use tracing::{debug, info, instrument, warn};
use vantage_core::protocol::eeprom::{self, SetupBits};
use vantage_core::sensor::detect_sensors;
use vantage_core::station::{update_batteries, update_link_quality};
use vantage_core::units::feet_to_mm;
use vantage_core::weather::{MANUFACTURER, MODEL};
use vantage_core::{
    CurrentWeather, DecodeContext, Gust, Loop2Record, LoopRecord, Parameters, Percentage,
    RainCollector, Sensor, SensorStation, WindCupSize, WindHeadingHistogram,
};

use crate::console::Console;
use crate::dump::ArchiveDump;
use crate::error::StationError;
use crate::transport::Transport;

/// Console clocks drift; they are reset at most this often.
const CLOCK_SYNC_INTERVAL: SignedDuration = SignedDuration::from_hours(24);

/// A configured connection to one console.
///
/// Holds what was learned during configuration plus the state carried
/// between current weather reads.
pub struct StationSession {
    console: Console,
    rain_collector: RainCollector,
    wind_cup_size: WindCupSize,
    archive_period: u8,
    stations: Vec<SensorStation>,
    sensors: Option<Vec<Sensor>>,
    next_record: Option<u16>,
    recent_gust: Option<Gust>,
    wind: WindHeadingHistogram,
    clock_synced_at: Option<Timestamp>,
}

impl StationSession {
    /// Wake the console and read its configuration.
    ///
    /// A console that never wakes yields [`StationError::WakeupFailed`];
    /// any configuration read failing yields [`StationError::Configuration`].
    #[instrument(name = "session_start", skip_all)]
    pub fn start(transport: Transport) -> Result<Self, StationError> {
        let mut console = Console::new(transport);
        console.wakeup()?;

        let setup = console
            .read_eeprom(eeprom::SETUP_BITS)
            .and_then(|bytes| Ok(SetupBits::decode(bytes[0])?))
            .map_err(StationError::configuration("setup bits"))?;

        let archive_period = console
            .read_eeprom(eeprom::ARCHIVE_PERIOD)
            .map(|bytes| bytes[0])
            .map_err(StationError::configuration("archive period"))?;

        let stations = console
            .read_eeprom(eeprom::STATION_LIST)
            .and_then(|bytes| Ok(eeprom::decode_station_list(&bytes)?))
            .map_err(StationError::configuration("station list"))?;

        info!(
            rain_collector = ?setup.rain_collector,
            wind_cup_size = ?setup.wind_cup_size,
            archive_period,
            stations = stations.len(),
            "Console configured"
        );

        Ok(Self {
            console,
            rain_collector: setup.rain_collector,
            wind_cup_size: setup.wind_cup_size,
            archive_period,
            stations,
            sensors: None,
            next_record: None,
            recent_gust: None,
            wind: WindHeadingHistogram::new(),
            clock_synced_at: None,
        })
    }

    pub fn console(&mut self) -> &mut Console {
        &mut self.console
    }

    pub fn wakeup(&mut self) -> Result<(), StationError> {
        self.console.wakeup()
    }

    /// Reopen the port of a console that no longer answers wakeups.
    pub fn reopen(&mut self) -> Result<(), StationError> {
        self.console.transport().reopen()
    }

    /// End the session and release the port.
    pub fn close(self) {
        self.console.close();
    }

    pub fn rain_collector(&self) -> RainCollector {
        self.rain_collector
    }

    /// Minutes per archive record.
    pub fn archive_period(&self) -> u8 {
        self.archive_period
    }

    pub fn stations(&self) -> &[SensorStation] {
        &self.stations
    }

    /// Sensors detected from the first LOOP packet, if one was read yet.
    pub fn sensors(&self) -> Option<&[Sensor]> {
        self.sensors.as_deref()
    }

    /// Archive pointer from the most recent LOOP packet.
    pub fn next_record(&self) -> Option<u16> {
        self.next_record
    }

    pub fn update_link_quality(&mut self, quality: Percentage) {
        update_link_quality(&mut self.stations, quality);
    }

    pub fn parameters(&mut self) -> Result<Parameters, StationError> {
        let firmware_date = self.console.firmware_date()?;
        let firmware_version = self.console.firmware_version()?;
        let latitude = eeprom::decode_coordinate(&self.console.read_eeprom(eeprom::LATITUDE)?)?;
        let longitude = eeprom::decode_coordinate(&self.console.read_eeprom(eeprom::LONGITUDE)?)?;
        let elevation = eeprom::decode_elevation(&self.console.read_eeprom(eeprom::ELEVATION)?)?;
        let rain_season_start = self.console.read_eeprom(eeprom::RAIN_SEASON_START)?[0];

        Ok(Parameters {
            manufacturer: MANUFACTURER.into(),
            model: MODEL.into(),
            firmware_date: firmware_date.into(),
            firmware_version: firmware_version.into(),
            latitude,
            longitude,
            elevation_mm: feet_to_mm(f64::from(elevation)),
            rain_season_start,
            archive_period: self.archive_period,
            wind_cup_size: self.wind_cup_size,
            rain_collector: self.rain_collector,
        })
    }

    pub fn console_time(&mut self) -> Result<DateTime, StationError> {
        self.console.console_time()
    }

    pub fn set_console_time(&mut self, time: DateTime) -> Result<(), StationError> {
        self.console.set_console_time(time)
    }

    /// Set the console clock to the local time if it was not set within the
    /// last day. Returns whether the clock was set.
    pub fn sync_clock_if_due(&mut self, now: Timestamp) -> Result<bool, StationError> {
        let due = self
            .clock_synced_at
            .is_none_or(|at| now.duration_since(at) >= CLOCK_SYNC_INTERVAL);
        if !due {
            return Ok(false);
        }

        let local = Zoned::now().datetime();
        self.console.set_console_time(local)?;
        self.clock_synced_at = Some(now);
        info!(time = %local, "Console clock set");
        Ok(true)
    }

    /// Stream `cycles` LOOP/LOOP2 pairs.
    pub fn current_weather(
        &mut self,
        cycles: usize,
    ) -> Result<CurrentWeatherBurst<'_>, StationError> {
        self.console.start_loop(cycles)?;
        Ok(CurrentWeatherBurst {
            session: self,
            cycles,
            cycle: 0,
            finished: false,
        })
    }

    /// Download the whole archive memory without filtering.
    pub fn dump(&mut self) -> Result<ArchiveDump<'_>, StationError> {
        let ctx = self.decode_context();
        ArchiveDump::full(&mut self.console, ctx)
    }

    /// Download the records archived after `since`.
    pub fn dump_after(&mut self, since: DateTime) -> Result<ArchiveDump<'_>, StationError> {
        let ctx = self.decode_context();
        ArchiveDump::after(&mut self.console, ctx, since)
    }

    fn decode_context(&self) -> DecodeContext {
        DecodeContext {
            rain: self.rain_collector,
            archive_period: self.archive_period,
            recent_gust: self.recent_gust,
            now: Zoned::now().datetime(),
        }
    }

    fn read_current_weather(&mut self) -> Result<CurrentWeather, StationError> {
        let conditions = LoopRecord::decode(&self.console.read_frame()?, self.rain_collector)?;
        thread::sleep(self.console.pacing().packet_settle);
        let extended = Loop2Record::decode(&self.console.read_frame()?, self.rain_collector)?;

        self.wind.add_heading(f64::from(conditions.wind_direction));
        self.recent_gust = Some(Gust {
            speed: extended.wind_gust_10min,
            direction: Some(f64::from(extended.wind_gust_direction_10min)),
        });
        update_batteries(&mut self.stations, &conditions);
        if self.sensors.is_none() {
            let sensors = detect_sensors(&conditions);
            info!(count = sensors.len(), "Detected sensors");
            self.sensors = Some(sensors);
        }
        self.next_record = Some(conditions.next_record);

        Ok(CurrentWeather {
            time: Timestamp::now(),
            dominant_headings: self.wind.past_headings().into(),
            conditions,
            extended,
        })
    }

    fn resync(&mut self) {
        if let Err(e) = self.console.wakeup() {
            warn!(error = %e, "Failed to wake console after current weather");
        }
    }
}

/// Current weather read as a lazy sequence of LOOP/LOOP2 pairs.
///
/// Stopping early, or a failed read, wakes the console to end the stream.
pub struct CurrentWeatherBurst<'a> {
    session: &'a mut StationSession,
    cycles: usize,
    cycle: usize,
    finished: bool,
}

impl CurrentWeatherBurst<'_> {
    pub fn sensors(&self) -> Option<&[Sensor]> {
        self.session.sensors()
    }

    fn complete(&self) -> bool {
        self.finished || self.cycle >= self.cycles
    }
}

impl Iterator for CurrentWeatherBurst<'_> {
    type Item = Result<CurrentWeather, StationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.complete() {
            return None;
        }
        if self.cycle > 0 {
            thread::sleep(self.session.console.pacing().packet_settle);
        }

        match self.session.read_current_weather() {
            Ok(weather) => {
                self.cycle += 1;
                debug!(cycle = self.cycle, next_record = weather.next_record(), "Current weather");
                Some(Ok(weather))
            }
            Err(e) => {
                self.finished = true;
                self.session.resync();
                Some(Err(e))
            }
        }
    }
}

impl Drop for CurrentWeatherBurst<'_> {
    fn drop(&mut self) {
        if !self.complete() {
            self.session.resync();
        }
    }
}
