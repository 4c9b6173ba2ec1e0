use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use jiff::civil::DateTime;
use jiff::{SignedDuration, Timestamp, Zoned};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use vantage_core::station::{iss_reception, update_link_quality};

use crate::archive::ArchiveStore;
use crate::dump::DumpEvent;
use crate::error::StationError;
use crate::session::StationSession;
use crate::sink::{Message, Sink};

/// How far back the first download reaches when nothing was delivered before.
const DEFAULT_HISTORY: SignedDuration = SignedDuration::from_hours(365 * 24);
/// Archive records younger than this also report transmitter reception.
const RECENT_RECORD_AGE: SignedDuration = SignedDuration::from_hours(1);
const FAILED_PASS_BACKOFF: Duration = Duration::from_secs(1);

/// Polls one console and forwards what it reads to a [`Sink`].
///
/// Each pass reads a burst of current weather and, when the console has
/// archived something new, downloads the archive from the newest record
/// already delivered.
pub struct Driver<S, A> {
    session: StationSession,
    sink: S,
    store: A,
    cycles: usize,
    cancel: CancellationToken,
    /// Set until the station parameters were read after a sink (re)connection.
    /// Archive records are only persisted while it is set.
    first_pass: bool,
    announce_sensors: bool,
    /// Archive pointer after the last completed download.
    previous_next_record: Option<u16>,
    last_delivered: DateTime,
}

impl<S: Sink, A: ArchiveStore> Driver<S, A> {
    pub fn new(session: StationSession, sink: S, store: A, cycles: usize) -> Self {
        let stored = store.newest_record_time().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read newest stored record");
            None
        });
        let last_delivered = sink
            .newest_record_time()
            .or(stored)
            .unwrap_or_else(|| Zoned::now().datetime() - DEFAULT_HISTORY);

        info!(%last_delivered, cycles, "Driver created");

        Self {
            session,
            sink,
            store,
            cycles,
            cancel: CancellationToken::new(),
            first_pass: true,
            announce_sensors: true,
            previous_next_record: None,
            last_delivered,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn session(&self) -> &StationSession {
        &self.session
    }

    /// Time of the newest archive record handed to the sink.
    pub fn last_delivered(&self) -> DateTime {
        self.last_delivered
    }

    pub fn previous_next_record(&self) -> Option<u16> {
        self.previous_next_record
    }

    pub fn is_first_pass(&self) -> bool {
        self.first_pass
    }

    /// One pass of the polling loop.
    #[instrument(name = "pass", skip_all)]
    pub fn run_pass(&mut self) -> Result<(), StationError> {
        if let Err(e) = self.session.wakeup() {
            if matches!(e, StationError::WakeupFailed)
                && let Err(reopen) = self.session.reopen()
            {
                error!(error = %reopen, "Failed to reopen console port");
            }
            return Err(e);
        }

        if self.sink.take_reconnected() {
            info!("Sink connected");
            self.first_pass = true;
            self.announce_sensors = true;
            if let Some(newest) = self.sink.newest_record_time() {
                self.last_delivered = newest;
                self.previous_next_record = None;
            }
        }

        if self.first_pass && self.sink.is_connected() {
            self.announce_station();
        }

        if let Err(e) = self.session.sync_clock_if_due(Timestamp::now()) {
            warn!(error = %e, "Failed to set console clock");
        }

        self.read_current_weather()?;

        if self.previous_next_record != self.session.next_record() && self.sink.is_connected() {
            self.catch_up()?;
        }

        Ok(())
    }

    fn announce_station(&mut self) {
        match self.session.parameters() {
            Ok(parameters) => {
                deliver(&self.sink, &Message::Parameters { parameters });
                self.first_pass = false;
            }
            Err(e) => warn!(error = %e, "Failed to read station parameters"),
        }

        deliver(
            &self.sink,
            &Message::SensorStations {
                stations: self.session.stations().to_vec(),
            },
        );
    }

    fn read_current_weather(&mut self) -> Result<(), StationError> {
        let previous = self.previous_next_record;
        let mut burst = self.session.current_weather(self.cycles)?;

        while let Some(weather) = burst.next() {
            let weather = weather?;

            if self.announce_sensors
                && let Some(sensors) = burst.sensors()
                && deliver(
                    &self.sink,
                    &Message::Sensors {
                        sensors: sensors.to_vec(),
                    },
                )
            {
                self.announce_sensors = false;
            }

            let next_record = weather.next_record();
            deliver(
                &self.sink,
                &Message::CurrentWeather {
                    weather: Box::new(weather),
                },
            );

            if previous != Some(next_record) {
                debug!(?previous, next_record, "Archive pointer moved");
                break;
            }
            if self.cancel.is_cancelled() {
                break;
            }
        }

        Ok(())
    }

    /// Download and deliver everything archived after the last delivered record.
    pub fn catch_up(&mut self) -> Result<(), StationError> {
        let since = self.last_delivered;
        let next_record = self.session.next_record();
        let archive_period = self.session.archive_period();
        let mut stations = self.session.stations().to_vec();
        let mut link_quality = None;
        let now = Zoned::now().datetime();
        let mut delivered = 0usize;

        let mut dump = self.session.dump_after(since)?;
        while let Some(event) = dump.next() {
            match event? {
                DumpEvent::Record(record) => {
                    if let Err(e) = self.store.append(std::slice::from_ref(&record)) {
                        warn!(error = %e, time = %record.time, "Failed to persist archive record");
                    }
                    if self.first_pass {
                        continue;
                    }

                    if record.is_recent(now, RECENT_RECORD_AGE) {
                        let quality = iss_reception(record.wind_sample_count, archive_period);
                        update_link_quality(&mut stations, quality);
                        link_quality = Some(quality);
                        deliver(
                            &self.sink,
                            &Message::SensorStationStatus {
                                time: record.time,
                                stations: stations.clone(),
                            },
                        );
                    }

                    let time = record.time;
                    let message = Message::Archive {
                        record: Box::new(record),
                    };
                    if !deliver(&self.sink, &message) {
                        warn!(%time, "Stopping archive download");
                        break;
                    }
                    self.last_delivered = time;
                    delivered += 1;
                }
                DumpEvent::End => {
                    self.previous_next_record = next_record;
                }
            }
        }
        drop(dump);

        if let Some(quality) = link_quality {
            self.session.update_link_quality(quality);
        }
        info!(%since, delivered, "Archive catch-up finished");
        Ok(())
    }

    /// Initial catch-up, then passes until cancelled.
    pub fn run(&mut self) {
        info!("Driver running");

        if let Err(e) = self.catch_up() {
            error!(error = %e, "Initial archive download failed");
        }

        while !self.cancel.is_cancelled() {
            if let Err(e) = self.run_pass() {
                error!(error = %e, "Pass failed");
                thread::sleep(FAILED_PASS_BACKOFF);
            }
        }

        info!("Driver loop stopped");
    }

    /// Run the driver on a dedicated worker thread.
    ///
    /// Returns once the worker is running.
    pub fn start(mut self) -> std::io::Result<DriverHandle<S, A>> {
        let cancel = self.cancel.clone();
        let (ready_tx, ready_rx) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("vantage-driver".to_owned())
            .spawn(move || {
                let _ = ready_tx.send(());
                self.run();
                self
            })?;

        if ready_rx.recv().is_err() {
            warn!("Driver worker exited before it was ready");
        }

        Ok(DriverHandle { cancel, worker })
    }

    /// Close the console port and disconnect the sink.
    pub fn shutdown(self) {
        self.session.close();
        self.sink.disconnect();
        info!("Driver shut down");
    }
}

/// Handle to a driver running on its worker thread.
pub struct DriverHandle<S, A> {
    cancel: CancellationToken,
    worker: JoinHandle<Driver<S, A>>,
}

impl<S: Sink, A: ArchiveStore> DriverHandle<S, A> {
    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }

    /// Stop the worker after its current pass and release the console.
    pub fn stop(self) -> thread::Result<()> {
        self.cancel.cancel();
        let driver = self.worker.join()?;
        driver.shutdown();
        Ok(())
    }
}

/// Send `message` if the sink is connected. Failures are logged only.
fn deliver<S: Sink>(sink: &S, message: &Message) -> bool {
    if !sink.is_connected() {
        debug!(kind = message.kind(), "Sink disconnected, dropping message");
        return false;
    }

    match sink.send(message) {
        Ok(()) => true,
        Err(e) => {
            warn!(kind = message.kind(), error = %e, "Failed to deliver message");
            false
        }
    }
}
