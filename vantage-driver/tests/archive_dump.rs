use std::time::Duration;

use jiff::ToSpan;
use jiff::civil::{DateTime, date};
use vantage_core::protocol::{ACK, ESCAPE, NACK};
use vantage_driver::transport::mock::archive_record;
use vantage_driver::{DumpEvent, MockConsole, Pacing, StationError, StationSession, Transport};

fn dummy_session(mock: &MockConsole) -> StationSession {
    let transport = Transport::new(mock.clone(), Duration::from_millis(50), Pacing::IMMEDIATE);
    StationSession::start(transport).unwrap()
}

fn base_time() -> DateTime {
    date(2024, 5, 1).at(10, 0, 0, 0)
}

/// A console holding `count` records five minutes apart from 10:00.
fn dummy_console(count: i64) -> MockConsole {
    let mock = MockConsole::new();
    for i in 0..count {
        mock.push_record(archive_record(base_time() + (i * 5).minutes(), 117));
    }
    mock
}

fn record_times(events: &[DumpEvent]) -> Vec<DateTime> {
    events
        .iter()
        .filter_map(|e| match e {
            DumpEvent::Record(r) => Some(r.time),
            DumpEvent::End => None,
        })
        .collect()
}

#[test]
fn nothing_newer_yields_only_end() -> Result<(), StationError> {
    let mock = dummy_console(3);
    let mut session = dummy_session(&mock);
    let since = base_time() + 1.hour();

    let mut dump = session.dump_after(since)?;
    assert_eq!(dump.page_count(), 0);
    let events = dump.by_ref().collect::<Result<Vec<_>, _>>()?;

    assert_eq!(events, vec![DumpEvent::End]);
    assert_eq!(dump.newest(), Some(since));
    drop(dump);
    assert_eq!(mock.controls(), vec![ACK]);
    Ok(())
}

#[test]
fn dump_after_skips_records_before_first_record() -> Result<(), StationError> {
    let mock = dummy_console(7);
    let mut session = dummy_session(&mock);

    let events = session
        .dump_after(base_time() + 5.minutes())?
        .collect::<Result<Vec<_>, _>>()?;

    let expected: Vec<DateTime> = (2..7).map(|i| base_time() + (i * 5).minutes()).collect();
    assert_eq!(record_times(&events), expected);
    assert_eq!(events.last(), Some(&DumpEvent::End));
    Ok(())
}

#[test]
fn dump_after_an_unstorable_date_downloads_everything() -> Result<(), StationError> {
    let mock = dummy_console(4);
    let mut session = dummy_session(&mock);

    let events = session
        .dump_after(date(1970, 1, 1).at(0, 0, 0, 0))?
        .collect::<Result<Vec<_>, _>>()?;

    let expected: Vec<DateTime> = (0..4).map(|i| base_time() + (i * 5).minutes()).collect();
    assert_eq!(record_times(&events), expected);
    assert!(mock.commands().contains(&"DMPAFT".to_owned()));
    Ok(())
}

#[test]
fn every_page_is_acknowledged() -> Result<(), StationError> {
    let mock = dummy_console(7);
    let mut session = dummy_session(&mock);

    let events = session
        .dump_after(base_time() - 1.minute())?
        .collect::<Result<Vec<_>, _>>()?;

    assert_eq!(record_times(&events).len(), 7);
    // Header, then one per page.
    assert_eq!(mock.controls(), vec![ACK, ACK, ACK]);
    assert!(mock.commands().contains(&"DMPAFT".to_owned()));
    Ok(())
}

#[test]
fn page_recovers_after_two_crc_failures() -> Result<(), StationError> {
    let mock = dummy_console(3);
    mock.corrupt_pages(2);
    let mut session = dummy_session(&mock);

    let events = session
        .dump_after(base_time() - 1.minute())?
        .collect::<Result<Vec<_>, _>>()?;

    assert_eq!(record_times(&events).len(), 3);
    assert_eq!(mock.controls(), vec![ACK, NACK, NACK, ACK]);
    Ok(())
}

#[test]
fn page_gives_up_after_three_failures() {
    let mock = dummy_console(3);
    mock.corrupt_pages(3);
    let mut session = dummy_session(&mock);

    let results: Vec<_> = session.dump_after(base_time() - 1.minute()).unwrap().collect();

    assert_eq!(results.len(), 1);
    assert!(matches!(
        results[0],
        Err(StationError::ProtocolExhausted {
            page: 0,
            attempts: 3
        })
    ));
    assert_eq!(mock.controls(), vec![ACK, NACK, NACK, ESCAPE]);
}

#[test]
fn stale_records_after_wraparound_are_skipped() -> Result<(), StationError> {
    let mock = dummy_console(5);
    // Leftovers from before the ring buffer wrapped.
    mock.push_record(archive_record(base_time() - 30.minutes(), 117));
    mock.push_record(archive_record(base_time() + 10.minutes(), 117));
    let mut session = dummy_session(&mock);

    let mut dump = session.dump_after(base_time() - 1.hour())?;
    let events = dump.by_ref().collect::<Result<Vec<_>, _>>()?;

    let expected: Vec<DateTime> = (0..5).map(|i| base_time() + (i * 5).minutes()).collect();
    assert_eq!(record_times(&events), expected);
    assert_eq!(dump.newest(), Some(base_time() + 20.minutes()));
    Ok(())
}

#[test]
fn dropping_dump_cancels_download() -> Result<(), StationError> {
    let mock = dummy_console(7);
    let mut session = dummy_session(&mock);

    {
        let mut dump = session.dump_after(base_time() - 1.minute())?;
        let first = dump.next().transpose()?;
        assert!(matches!(first, Some(DumpEvent::Record(_))));
    }

    assert_eq!(mock.controls(), vec![ACK, ESCAPE]);
    // The console is back in command mode.
    session.wakeup()?;
    Ok(())
}

#[test]
fn full_dump_reads_every_page_unfiltered() -> Result<(), StationError> {
    let mock = dummy_console(3);
    mock.push_record(archive_record(base_time() - 1.day(), 117));
    let mut session = dummy_session(&mock);

    let mut dump = session.dump()?;
    assert_eq!(dump.page_count(), 512);
    let events = dump.by_ref().collect::<Result<Vec<_>, _>>()?;
    drop(dump);

    assert_eq!(record_times(&events).len(), 4);
    assert_eq!(events.last(), Some(&DumpEvent::End));
    assert_eq!(mock.controls().iter().filter(|&&c| c == ACK).count(), 512);
    Ok(())
}

#[test]
fn records_carry_archive_period() -> Result<(), StationError> {
    let mock = dummy_console(1);
    let mut session = dummy_session(&mock);

    let events = session
        .dump_after(base_time() - 1.minute())?
        .collect::<Result<Vec<_>, _>>()?;

    let DumpEvent::Record(record) = &events[0] else {
        panic!("expected a record, got {:?}", events[0]);
    };
    assert_eq!(record.duration_secs, 300);
    assert_eq!(record.wind_sample_count, 117);
    assert_eq!(record.outside_humidity, Some(63));
    Ok(())
}
