use std::time::Duration;

use jiff::civil::{DateTime, date};
use jiff::{ToSpan, Zoned};
use vantage_core::Percentage;
use vantage_core::protocol::ESCAPE;
use vantage_driver::transport::mock::archive_record;
use vantage_driver::{
    Driver, MemoryArchive, MemorySink, Message, MockConsole, Pacing, Sink, StationError,
    StationSession, Transport,
};

const CYCLES: usize = 3;

fn minute_now() -> DateTime {
    Zoned::now()
        .datetime()
        .with()
        .second(0)
        .subsec_nanosecond(0)
        .build()
        .unwrap()
}

fn dummy_driver(
    mock: &MockConsole,
    sink: &MemorySink,
) -> (Driver<MemorySink, MemoryArchive>, MemoryArchive) {
    let transport = Transport::new(mock.clone(), Duration::from_millis(50), Pacing::IMMEDIATE);
    let session = StationSession::start(transport).unwrap();
    let store = MemoryArchive::default();
    let driver = Driver::new(session, sink.clone(), store.clone(), CYCLES);
    (driver, store)
}

fn count(kinds: &[&str], kind: &str) -> usize {
    kinds.iter().filter(|k| **k == kind).count()
}

fn archive_times(sink: &MemorySink) -> Vec<DateTime> {
    sink.messages()
        .iter()
        .filter_map(|m| match m {
            Message::Archive { record } => Some(record.time),
            _ => None,
        })
        .collect()
}

#[test]
fn first_pass_announces_station_then_catches_up() -> Result<(), StationError> {
    let now = minute_now();
    let mock = MockConsole::new();
    for age in [20, 15, 10] {
        mock.push_record(archive_record(now - age.minutes(), 117));
    }
    let sink = MemorySink::new();
    let (mut driver, store) = dummy_driver(&mock, &sink);

    // The initial download only persists.
    driver.catch_up()?;
    assert!(sink.messages().is_empty());
    assert_eq!(store.len().unwrap(), 3);

    driver.run_pass()?;
    let kinds = sink.kinds();

    assert_eq!(&kinds[..4], &["parameters", "sensor_stations", "sensors", "current_weather"]);
    assert_eq!(count(&kinds, "sensors"), 1);
    assert_eq!(count(&kinds, "current_weather"), 1);
    assert_eq!(count(&kinds, "archive"), 3);
    assert_eq!(count(&kinds, "sensor_station_status"), 3);
    assert!(!driver.is_first_pass());
    assert_eq!(driver.previous_next_record(), Some(3));
    assert_eq!(driver.last_delivered(), now - 10.minutes());
    assert_eq!(mock.clock_sets().len(), 1);
    Ok(())
}

#[test]
fn steady_pass_streams_without_download() -> Result<(), StationError> {
    let now = minute_now();
    let mock = MockConsole::new();
    mock.push_record(archive_record(now - 10.minutes(), 117));
    let sink = MemorySink::new();
    let (mut driver, _) = dummy_driver(&mock, &sink);

    driver.run_pass()?;
    let downloads = count_command(&mock, "DMPAFT");
    sink.clear();

    driver.run_pass()?;

    assert_eq!(sink.kinds(), vec!["current_weather"; CYCLES]);
    assert_eq!(count_command(&mock, "DMPAFT"), downloads);
    Ok(())
}

#[test]
fn pointer_change_triggers_download() -> Result<(), StationError> {
    let now = minute_now();
    let mock = MockConsole::new();
    mock.push_record(archive_record(now - 10.minutes(), 117));
    let sink = MemorySink::new();
    let (mut driver, store) = dummy_driver(&mock, &sink);

    driver.run_pass()?;
    sink.clear();

    mock.push_record(archive_record(now - 5.minutes(), 58));
    driver.run_pass()?;

    let kinds = sink.kinds();
    assert_eq!(kinds, vec!["current_weather", "sensor_station_status", "archive"]);
    assert_eq!(archive_times(&sink), vec![now - 5.minutes()]);
    assert_eq!(driver.previous_next_record(), Some(2));
    assert_eq!(store.len().unwrap(), 2);

    // 58 of 117 expected wind samples.
    let quality = driver.session().stations()[0].link_quality;
    assert_eq!(quality, Percentage(49));
    Ok(())
}

#[test]
fn failed_delivery_stops_download_and_resumes_next_pass() -> Result<(), StationError> {
    let base = minute_now() - 2.days();
    let mock = MockConsole::new();
    for i in 0..3 {
        mock.push_record(archive_record(base + (i * 5).minutes(), 117));
    }
    let sink = MemorySink::new();
    let (mut driver, _) = dummy_driver(&mock, &sink);

    driver.run_pass()?;
    assert_eq!(driver.last_delivered(), base + 10.minutes());

    mock.push_record(archive_record(base + 15.minutes(), 117));
    mock.push_record(archive_record(base + 20.minutes(), 117));
    // The current weather message and the first archive record.
    sink.fail_next_sends(2);
    driver.run_pass()?;

    assert_eq!(driver.last_delivered(), base + 10.minutes());
    assert_eq!(driver.previous_next_record(), Some(3));
    assert_eq!(mock.controls().last(), Some(&ESCAPE));

    driver.run_pass()?;

    assert_eq!(driver.last_delivered(), base + 20.minutes());
    assert_eq!(driver.previous_next_record(), Some(5));
    let times = archive_times(&sink);
    assert_eq!(&times[times.len() - 2..], &[base + 15.minutes(), base + 20.minutes()]);
    Ok(())
}

#[test]
fn reconnected_sink_gets_station_announced_again() -> Result<(), StationError> {
    let mock = MockConsole::new();
    let sink = MemorySink::new();
    let (mut driver, _) = dummy_driver(&mock, &sink);

    driver.run_pass()?;
    sink.set_connected(false);
    sink.clear();

    driver.run_pass()?;
    assert!(sink.messages().is_empty());

    sink.set_connected(true);
    driver.run_pass()?;

    let kinds = sink.kinds();
    assert_eq!(&kinds[..3], &["parameters", "sensor_stations", "sensors"]);
    assert_eq!(count(&kinds, "sensors"), 1);
    Ok(())
}

#[test]
fn resumes_after_sink_newest_record() -> Result<(), StationError> {
    let base = minute_now() - 3.hours();
    let mock = MockConsole::new();
    for i in 0..4 {
        mock.push_record(archive_record(base + (i * 5).minutes(), 117));
    }
    let sink = MemorySink::new().with_newest_record_time(base + 5.minutes());
    let (mut driver, _) = dummy_driver(&mock, &sink);
    assert_eq!(driver.last_delivered(), base + 5.minutes());

    driver.run_pass()?;

    assert_eq!(
        archive_times(&sink),
        vec![base + 10.minutes(), base + 15.minutes()]
    );
    Ok(())
}

#[test]
fn sink_newest_record_before_console_dates_downloads_everything() -> Result<(), StationError> {
    let base = minute_now() - 3.hours();
    let mock = MockConsole::new();
    for i in 0..3 {
        mock.push_record(archive_record(base + (i * 5).minutes(), 117));
    }
    let epoch = date(1970, 1, 1).at(0, 0, 0, 0);
    let sink = MemorySink::new().with_newest_record_time(epoch);
    let (mut driver, _) = dummy_driver(&mock, &sink);

    driver.run_pass()?;

    assert_eq!(
        archive_times(&sink),
        vec![base, base + 5.minutes(), base + 10.minutes()]
    );
    Ok(())
}

#[test]
fn unanswered_wakeups_reopen_the_port() -> Result<(), StationError> {
    let mock = MockConsole::new();
    let sink = MemorySink::new();
    let (mut driver, _) = dummy_driver(&mock, &sink);
    mock.ignore_wakeups(5);

    let failed = driver.run_pass();
    assert!(matches!(failed, Err(StationError::WakeupFailed)));
    assert_eq!(mock.reopens(), 1);
    assert!(sink.messages().is_empty());

    driver.run_pass()?;
    assert_eq!(mock.reopens(), 1);
    assert_eq!(count(&sink.kinds(), "current_weather"), 1);
    Ok(())
}

#[test]
fn stop_joins_worker_and_disconnects_sink() {
    let mock = MockConsole::new();
    let sink = MemorySink::new();
    let (driver, _) = dummy_driver(&mock, &sink);

    let handle = driver.start().unwrap();
    std::thread::sleep(Duration::from_millis(20));
    handle.stop().unwrap();

    assert!(!sink.is_connected());
}

fn count_command(mock: &MockConsole, command: &str) -> usize {
    mock.commands().iter().filter(|c| *c == command).count()
}
