use std::collections::VecDeque;

use jiff::civil::DateTime;
use tracing::{debug, info, warn};
use vantage_core::protocol::archive::{
    EARLIEST_RECORD_TIME, is_empty_record, pack_date, pack_time, page_records,
};
use vantage_core::protocol::{
    ACK, ARCHIVE_PAGE_COUNT, ARCHIVE_PAGE_SIZE, CRC_SIZE, DUMP_AFTER_PAYLOAD_SIZE, ESCAPE, NACK,
    crc,
};
use vantage_core::{ArchiveRecord, DecodeContext};

use crate::console::Console;
use crate::error::StationError;

/// Attempts per archive page, shared between read and CRC failures.
pub const PAGE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum DumpEvent {
    Record(ArchiveRecord),
    /// The console has sent every page.
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// The console is transmitting the current page.
    AwaitingPage,
    /// The current page was decoded and the console waits for our reply.
    Draining,
    EndPending,
    Finished,
}

/// A lazily read archive download.
///
/// Pages are requested one at a time as records are pulled. Dropping the
/// dump before [`DumpEvent::End`] cancels the download on the console.
pub struct ArchiveDump<'a> {
    console: &'a mut Console,
    ctx: DecodeContext,
    pages: u16,
    page: u16,
    first_record: usize,
    /// Records not strictly newer than this are skipped.
    newest: Option<DateTime>,
    pending: VecDeque<ArchiveRecord>,
    state: State,
}

impl<'a> ArchiveDump<'a> {
    /// Download the whole archive memory.
    pub(crate) fn full(console: &'a mut Console, ctx: DecodeContext) -> Result<Self, StationError> {
        console.send_acked("DMP")?;
        info!(pages = ARCHIVE_PAGE_COUNT, "Dumping full archive");
        Ok(Self::new(console, ctx, ARCHIVE_PAGE_COUNT, 0, None))
    }

    /// Download the records archived after `since`.
    ///
    /// A `since` older than any date the console can store downloads everything.
    pub(crate) fn after(
        console: &'a mut Console,
        ctx: DecodeContext,
        since: DateTime,
    ) -> Result<Self, StationError> {
        let since = since.max(EARLIEST_RECORD_TIME);
        let date = pack_date(since.date())?;

        console.send_acked("DMPAFT")?;

        let mut payload = Vec::with_capacity(DUMP_AFTER_PAYLOAD_SIZE + CRC_SIZE);
        payload.extend(date.to_le_bytes());
        payload.extend(pack_time(since.time()).to_le_bytes());
        crc::append(&mut payload);
        console.write(&payload)?;
        console.expect_ack("DMPAFT timestamp")?;

        let header = console
            .transport()
            .read_exact(DUMP_AFTER_PAYLOAD_SIZE + CRC_SIZE)?;
        crc::check(&header, DUMP_AFTER_PAYLOAD_SIZE)?;
        console.write_control(ACK)?;

        let pages = u16::from_le_bytes([header[0], header[1]]);
        let first_record = u16::from_le_bytes([header[2], header[3]]);
        info!(pages, first_record, %since, "Dumping archive");

        Ok(Self::new(
            console,
            ctx,
            pages,
            usize::from(first_record),
            Some(since),
        ))
    }

    fn new(
        console: &'a mut Console,
        ctx: DecodeContext,
        pages: u16,
        first_record: usize,
        newest: Option<DateTime>,
    ) -> Self {
        let state = if pages == 0 {
            State::EndPending
        } else {
            State::AwaitingPage
        };

        Self {
            console,
            ctx,
            pages,
            page: 0,
            first_record,
            newest,
            pending: VecDeque::new(),
            state,
        }
    }

    pub fn page_count(&self) -> u16 {
        self.pages
    }

    /// Time of the newest record delivered so far.
    pub fn newest(&self) -> Option<DateTime> {
        self.newest
    }

    fn read_page(&mut self) -> Result<Vec<ArchiveRecord>, StationError> {
        for attempt in 1..=PAGE_ATTEMPTS {
            match self
                .console
                .transport()
                .read_exact(ARCHIVE_PAGE_SIZE + CRC_SIZE)
            {
                Ok(page) => match crc::check(&page, ARCHIVE_PAGE_SIZE) {
                    Ok(()) => return Ok(self.decode_page(&page)),
                    Err(e) => warn!(page = self.page, attempt, error = %e, "Archive page rejected"),
                },
                Err(StationError::TransportTimeout { received, .. }) => {
                    warn!(page = self.page, attempt, received, "Archive page incomplete");
                }
                Err(e) => return Err(e),
            }

            if attempt < PAGE_ATTEMPTS {
                self.console.write_control(NACK)?;
            }
        }

        if let Err(e) = self.console.write_control(ESCAPE) {
            warn!(error = %e, "Failed to cancel archive download");
        }
        self.state = State::Finished;

        Err(StationError::ProtocolExhausted {
            page: self.page,
            attempts: PAGE_ATTEMPTS,
        })
    }

    fn decode_page(&mut self, page: &[u8]) -> Vec<ArchiveRecord> {
        let mut records = Vec::new();

        for bytes in page_records(page, self.first_record) {
            if is_empty_record(bytes) {
                continue;
            }
            let record = match ArchiveRecord::decode(bytes, &self.ctx) {
                Ok(record) => record,
                Err(e) => {
                    warn!(page = self.page, error = %e, "Skipping undecodable archive record");
                    continue;
                }
            };
            // Stale records appear where the ring buffer wrapped.
            if self.newest.is_some_and(|newest| record.time <= newest) {
                debug!(time = %record.time, "Skipping stale archive record");
                continue;
            }
            records.push(record);
        }

        if let Some(last) = records.last() {
            self.newest = Some(last.time);
        }
        self.first_record = 0;
        records
    }
}

impl Iterator for ArchiveDump<'_> {
    type Item = Result<DumpEvent, StationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(Ok(DumpEvent::Record(record)));
            }

            match self.state {
                State::Finished => return None,
                State::EndPending => {
                    self.state = State::Finished;
                    return Some(Ok(DumpEvent::End));
                }
                State::Draining => {
                    if let Err(e) = self.console.write_control(ACK) {
                        self.state = State::Finished;
                        return Some(Err(e));
                    }
                    self.page += 1;
                    self.state = if self.page >= self.pages {
                        State::EndPending
                    } else {
                        State::AwaitingPage
                    };
                }
                State::AwaitingPage => match self.read_page() {
                    Ok(records) => {
                        self.pending.extend(records);
                        self.state = State::Draining;
                    }
                    Err(e) => {
                        self.state = State::Finished;
                        return Some(Err(e));
                    }
                },
            }
        }
    }
}

impl Drop for ArchiveDump<'_> {
    fn drop(&mut self) {
        if matches!(self.state, State::AwaitingPage | State::Draining) {
            debug!(page = self.page, "Cancelling archive download");
            if let Err(e) = self.console.write_control(ESCAPE) {
                warn!(error = %e, "Failed to cancel archive download");
            }
        }
    }
}
