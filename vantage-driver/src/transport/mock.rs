use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use jiff::civil::DateTime;
use jiff::{SignedDuration, Zoned};
use rand::Rng;
use tracing::debug;
use vantage_core::protocol::archive::{pack_date, pack_time, record_time, unpack_datetime};
use vantage_core::protocol::clock::{decode_console_time, encode_console_time};
use vantage_core::protocol::frame::{blank_frame, put_i16, seal};
use vantage_core::protocol::{
    ACK, ARCHIVE_PAGE_COUNT, ARCHIVE_RECORD_SIZE, CARRIAGE_RETURN, CONSOLE_TIME_SIZE, CRC_SIZE,
    DUMP_AFTER_PAYLOAD_SIZE, LINE_FEED, LOOP_PACKET_SIZE, LOOP_PACKET_TYPE, LOOP2_PACKET_TYPE,
    NACK, OK_RESPONSE, RECORDS_PER_PAGE, WAKEUP_RESPONSE, crc,
};

use super::Port;

pub const FIRMWARE_DATE: &str = "Apr 24 2002";
pub const FIRMWARE_VERSION: &str = "1.90";
pub const ARCHIVE_PERIOD_MINUTES: u8 = 5;

const EEPROM_SIZE: usize = 0x100;
const FULL_WIND_SAMPLES: u16 = 117;

/// A simulated console speaking the serial protocol.
///
/// Clones share the same device, so a test can hand one clone to the
/// transport and keep another to inspect what the driver sent.
#[derive(Clone)]
pub struct MockConsole {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    eeprom: [u8; EEPROM_SIZE],
    archive: Vec<[u8; ARCHIVE_RECORD_SIZE]>,
    next_record: u16,
    /// Append a fresh archive record whenever an archive period elapses.
    live: bool,
    clock: Option<DateTime>,
    input: Vec<u8>,
    output: VecDeque<u8>,
    mode: Mode,
    faults: Faults,
    commands: Vec<String>,
    controls: Vec<u8>,
    clock_sets: Vec<DateTime>,
    reopens: usize,
}

#[derive(Default)]
struct Faults {
    ignored_wakeups: usize,
    corrupt_pages: usize,
    loop_packet_limit: Option<usize>,
}

enum Mode {
    Command,
    SetTime,
    DumpAfterTimestamp,
    HeaderAck {
        pages: VecDeque<Vec<u8>>,
    },
    PageReply {
        pages: VecDeque<Vec<u8>>,
        current: Vec<u8>,
    },
}

impl MockConsole {
    /// A console with an ISS on transmitter 1, a 5 minute archive period
    /// and an empty archive.
    pub fn new() -> Self {
        let mut eeprom = [0u8; EEPROM_SIZE];
        eeprom[0x0B..0x0D].copy_from_slice(&377i16.to_le_bytes());
        eeprom[0x0D..0x0F].copy_from_slice(&(-1224i16).to_le_bytes());
        eeprom[0x0F..0x11].copy_from_slice(&150i16.to_le_bytes());
        for slot in eeprom[0x19..0x29].chunks_exact_mut(2) {
            slot.copy_from_slice(&[0x0A, 0xFF]);
        }
        eeprom[0x19] = 0x00;
        eeprom[0x2B] = 0x00;
        eeprom[0x2C] = 1;
        eeprom[0x2D] = ARCHIVE_PERIOD_MINUTES;

        Self {
            inner: Arc::new(Mutex::new(Inner {
                eeprom,
                archive: Vec::new(),
                next_record: 0,
                live: false,
                clock: None,
                input: Vec::new(),
                output: VecDeque::new(),
                mode: Mode::Command,
                faults: Faults::default(),
                commands: Vec::new(),
                controls: Vec::new(),
                clock_sets: Vec::new(),
                reopens: 0,
            })),
        }
    }

    /// A console that keeps archiving while it runs, seeded with
    /// `archive_records` records ending now.
    pub fn simulated(archive_records: usize) -> Self {
        let console = Self::new();
        let now = Zoned::now().datetime();
        let period = SignedDuration::from_mins(i64::from(ARCHIVE_PERIOD_MINUTES));

        for age in (1..=archive_records).rev() {
            let at = now - period * age as i32;
            console.push_record(archive_record(truncate_to_minute(at), FULL_WIND_SAMPLES));
        }

        console.lock().live = true;
        console
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a raw archive record and move the record pointer past it.
    pub fn push_record(&self, record: [u8; ARCHIVE_RECORD_SIZE]) {
        let mut inner = self.lock();
        inner.archive.push(record);
        inner.next_record = inner.archive.len() as u16;
    }

    pub fn set_next_record(&self, next_record: u16) {
        self.lock().next_record = next_record;
    }

    /// Overwrite EEPROM bytes starting at `address`.
    pub fn write_eeprom(&self, address: usize, bytes: &[u8]) {
        self.lock().eeprom[address..address + bytes.len()].copy_from_slice(bytes);
    }

    /// Answer only every wakeup after the next `count`.
    pub fn ignore_wakeups(&self, count: usize) {
        self.lock().faults.ignored_wakeups = count;
    }

    /// Corrupt the next `count` archive page transmissions.
    pub fn corrupt_pages(&self, count: usize) {
        self.lock().faults.corrupt_pages = count;
    }

    /// Stream at most `limit` packets per LPS command.
    pub fn limit_loop_packets(&self, limit: usize) {
        self.lock().faults.loop_packet_limit = Some(limit);
    }

    /// Text commands received so far, the empty string being a wakeup.
    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    /// Control bytes received while an archive download was in progress.
    pub fn controls(&self) -> Vec<u8> {
        self.lock().controls.clone()
    }

    pub fn clock_sets(&self) -> Vec<DateTime> {
        self.lock().clock_sets.clone()
    }

    /// How often the link was reopened.
    pub fn reopens(&self) -> usize {
        self.lock().reopens
    }
}

impl Default for MockConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for MockConsole {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.lock();
        let count = buf.len().min(inner.output.len());
        for (slot, byte) in buf.iter_mut().zip(inner.output.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

impl Write for MockConsole {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.lock();
        inner.input.extend_from_slice(buf);
        while inner.step() {}
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for MockConsole {
    fn clear_input(&mut self) -> io::Result<()> {
        self.lock().output.clear();
        Ok(())
    }

    /// A fresh link finds the console answering again.
    fn reopen(&mut self) -> io::Result<()> {
        let mut inner = self.lock();
        inner.reopens += 1;
        inner.faults.ignored_wakeups = 0;
        inner.input.clear();
        inner.output.clear();
        inner.mode = Mode::Command;
        Ok(())
    }
}

impl Inner {
    /// Consume one unit of input; false once more input is needed.
    fn step(&mut self) -> bool {
        match std::mem::replace(&mut self.mode, Mode::Command) {
            Mode::Command => {
                let Some(end) = self.input.iter().position(|&b| b == LINE_FEED) else {
                    return false;
                };
                let line: Vec<u8> = self.input.drain(..=end).collect();
                let command = String::from_utf8_lossy(&line[..end]).trim().to_owned();
                self.command(&command);
            }
            Mode::SetTime => {
                let Some(payload) = self.take(CONSOLE_TIME_SIZE + CRC_SIZE) else {
                    self.mode = Mode::SetTime;
                    return false;
                };
                let time = crc::check(&payload, CONSOLE_TIME_SIZE)
                    .and_then(|()| decode_console_time(&payload));
                match time {
                    Ok(time) => {
                        self.clock = Some(time);
                        self.clock_sets.push(time);
                        self.output.push_back(ACK);
                    }
                    Err(_) => self.output.push_back(NACK),
                }
            }
            Mode::DumpAfterTimestamp => {
                let Some(payload) = self.take(DUMP_AFTER_PAYLOAD_SIZE + CRC_SIZE) else {
                    self.mode = Mode::DumpAfterTimestamp;
                    return false;
                };
                self.dump_after(&payload);
            }
            Mode::HeaderAck { pages } => {
                let Some(control) = self.take_control() else {
                    self.mode = Mode::HeaderAck { pages };
                    return false;
                };
                if control == ACK {
                    self.send_next_page(pages);
                }
            }
            Mode::PageReply { pages, current } => {
                let Some(control) = self.take_control() else {
                    self.mode = Mode::PageReply { pages, current };
                    return false;
                };
                match control {
                    ACK => self.send_next_page(pages),
                    NACK => {
                        self.transmit(&current);
                        self.mode = Mode::PageReply { pages, current };
                    }
                    _ => debug!(control, "Archive download cancelled"),
                }
            }
        }
        true
    }

    fn command(&mut self, command: &str) {
        self.commands.push(command.to_owned());
        let mut words = command.split_whitespace();

        match words.next() {
            None => self.wakeup(),
            Some("TEST") => self.output.extend(b"\n\rTEST\n\r"),
            Some("VER") => self.reply_line(FIRMWARE_DATE),
            Some("NVER") => self.reply_line(FIRMWARE_VERSION),
            Some("EEBRD") => {
                let address = words.next().and_then(|w| usize::from_str_radix(w, 16).ok());
                let count = words.next().and_then(|w| usize::from_str_radix(w, 16).ok());
                match (address, count) {
                    (Some(address), Some(count)) if address + count <= EEPROM_SIZE => {
                        let mut data = self.eeprom[address..address + count].to_vec();
                        crc::append(&mut data);
                        self.output.push_back(ACK);
                        self.output.extend(data);
                    }
                    _ => self.output.push_back(NACK),
                }
            }
            Some("GETTIME") => {
                let now = self.clock.unwrap_or_else(|| Zoned::now().datetime());
                let mut data = encode_console_time(now).to_vec();
                crc::append(&mut data);
                self.output.push_back(ACK);
                self.output.extend(data);
            }
            Some("SETTIME") => {
                self.output.push_back(ACK);
                self.mode = Mode::SetTime;
            }
            Some("LPS") => {
                let count = words.nth(1).and_then(|w| w.parse::<usize>().ok());
                match count {
                    Some(count) => {
                        self.output.push_back(ACK);
                        self.stream_loop(count);
                    }
                    None => self.output.push_back(NACK),
                }
            }
            Some("DMPAFT") => {
                self.output.push_back(ACK);
                self.mode = Mode::DumpAfterTimestamp;
            }
            Some("DMP") => {
                self.output.push_back(ACK);
                let pages: VecDeque<Vec<u8>> = (0..ARCHIVE_PAGE_COUNT as usize)
                    .map(|index| self.page(index))
                    .collect();
                self.send_next_page(pages);
            }
            Some(other) => debug!(command = other, "Ignoring unknown command"),
        }
    }

    fn wakeup(&mut self) {
        if self.faults.ignored_wakeups > 0 {
            self.faults.ignored_wakeups -= 1;
            return;
        }
        // A wakeup also stops any packet stream still in flight.
        self.output.clear();
        self.output.extend(WAKEUP_RESPONSE);
    }

    fn reply_line(&mut self, line: &str) {
        self.output.extend(OK_RESPONSE);
        self.output.extend(line.as_bytes());
        self.output.extend([LINE_FEED, CARRIAGE_RETURN]);
    }

    fn stream_loop(&mut self, count: usize) {
        if self.live {
            self.archive_if_due();
        }
        let count = self
            .faults
            .loop_packet_limit
            .map_or(count, |limit| count.min(limit));

        let mut rng = rand::rng();
        for i in 0..count {
            let frame = if i % 2 == 0 {
                loop_frame(self.next_record, &mut rng)
            } else {
                loop2_frame(&mut rng)
            };
            self.output.extend(frame);
        }
    }

    fn archive_if_due(&mut self) {
        let now = truncate_to_minute(Zoned::now().datetime());
        let period = SignedDuration::from_mins(i64::from(self.eeprom[0x2D]));
        let due = match self.archive.last().and_then(|r| record_time(r).ok()) {
            Some(last) => now.duration_since(last) >= period,
            None => true,
        };
        if due {
            self.archive.push(archive_record(now, FULL_WIND_SAMPLES));
            self.next_record = self.archive.len() as u16;
        }
    }

    fn dump_after(&mut self, payload: &[u8]) {
        if !crc::verify(payload, DUMP_AFTER_PAYLOAD_SIZE) {
            self.output.push_back(NACK);
            return;
        }
        let date = u16::from_le_bytes([payload[0], payload[1]]);
        let time = u16::from_le_bytes([payload[2], payload[3]]);
        let Ok(since) = unpack_datetime(date, time) else {
            self.output.push_back(NACK);
            return;
        };

        let first_newer = self
            .archive
            .iter()
            .position(|r| record_time(r).is_ok_and(|t| t > since));

        let (pages, first_record) = match first_newer {
            Some(index) => {
                let page_count = self.archive.len().div_ceil(RECORDS_PER_PAGE);
                let start_page = index / RECORDS_PER_PAGE;
                let pages: VecDeque<Vec<u8>> =
                    (start_page..page_count).map(|p| self.page(p)).collect();
                (pages, index % RECORDS_PER_PAGE)
            }
            None => (VecDeque::new(), 0),
        };

        let mut header = Vec::with_capacity(DUMP_AFTER_PAYLOAD_SIZE + CRC_SIZE);
        header.extend((pages.len() as u16).to_le_bytes());
        header.extend((first_record as u16).to_le_bytes());
        crc::append(&mut header);

        self.output.push_back(ACK);
        self.output.extend(header);
        self.mode = Mode::HeaderAck { pages };
    }

    /// Archive page `index`: sequence byte, five record slots, four unused bytes, CRC.
    fn page(&self, index: usize) -> Vec<u8> {
        let mut page = Vec::with_capacity(1 + RECORDS_PER_PAGE * ARCHIVE_RECORD_SIZE + 4);
        page.push(index as u8);
        for slot in 0..RECORDS_PER_PAGE {
            match self.archive.get(index * RECORDS_PER_PAGE + slot) {
                Some(record) => page.extend(record),
                None => page.extend([0xFF; ARCHIVE_RECORD_SIZE]),
            }
        }
        page.extend([0u8; 4]);
        crc::append(&mut page);
        page
    }

    fn send_next_page(&mut self, mut pages: VecDeque<Vec<u8>>) {
        if let Some(page) = pages.pop_front() {
            self.transmit(&page);
            self.mode = Mode::PageReply {
                pages,
                current: page,
            };
        }
    }

    fn transmit(&mut self, page: &[u8]) {
        if self.faults.corrupt_pages > 0 {
            self.faults.corrupt_pages -= 1;
            let mut damaged = page.to_vec();
            damaged[1] ^= 0xFF;
            self.output.extend(damaged);
        } else {
            self.output.extend(page);
        }
    }

    fn take(&mut self, count: usize) -> Option<Vec<u8>> {
        (self.input.len() >= count).then(|| self.input.drain(..count).collect())
    }

    fn take_control(&mut self) -> Option<u8> {
        if self.input.is_empty() {
            return None;
        }
        let control = self.input.remove(0);
        self.controls.push(control);
        Some(control)
    }
}

/// A plausible archive record ending at `time`.
pub fn archive_record(time: DateTime, wind_samples: u16) -> [u8; ARCHIVE_RECORD_SIZE] {
    let mut record = [0xFFu8; ARCHIVE_RECORD_SIZE];
    // Outside the packed range the record reads back as an invalid timestamp.
    let date = pack_date(time.date()).unwrap_or(u16::MAX);
    put_i16(&mut record, 0, date as i16);
    put_i16(&mut record, 2, pack_time(time.time()) as i16);
    put_i16(&mut record, 4, 612);
    put_i16(&mut record, 6, 640);
    put_i16(&mut record, 8, 598);
    put_i16(&mut record, 10, 0);
    put_i16(&mut record, 12, 0);
    put_i16(&mut record, 14, 29_921);
    put_i16(&mut record, 16, 32767);
    put_i16(&mut record, 18, wind_samples as i16);
    put_i16(&mut record, 20, 705);
    record[22] = 41;
    record[23] = 63;
    record[24] = 4;
    record[25] = 11;
    record[26] = 5;
    record[27] = 4;
    record[29] = 0;
    put_i16(&mut record, 30, 32767);
    record[42] = 0x00;
    record
}

fn loop_frame(next_record: u16, rng: &mut impl Rng) -> [u8; LOOP_PACKET_SIZE] {
    let mut frame = blank_frame(LOOP_PACKET_TYPE);
    frame[3] = 0;
    put_i16(&mut frame, 5, next_record as i16);
    put_i16(&mut frame, 7, 29_921 + rng.random_range(-20..20));
    put_i16(&mut frame, 9, 705);
    frame[11] = 41;
    put_i16(&mut frame, 12, 600 + rng.random_range(-15..15));
    let wind: u8 = rng.random_range(0..12);
    frame[14] = wind;
    frame[15] = wind;
    put_i16(&mut frame, 16, rng.random_range(200..250));
    frame[18..33].fill(0xFF);
    frame[33] = 63;
    frame[34..41].fill(0xFF);
    put_i16(&mut frame, 41, 0);
    frame[43] = 0xFF;
    put_i16(&mut frame, 44, 32767);
    put_i16(&mut frame, 48, -1);
    frame[62..70].fill(0xFF);
    frame[86] = 0;
    put_i16(&mut frame, 87, 1452);
    frame[89] = 6;
    put_i16(&mut frame, 91, 612);
    put_i16(&mut frame, 93, 1958);
    seal(&mut frame);
    frame
}

fn loop2_frame(rng: &mut impl Rng) -> [u8; LOOP_PACKET_SIZE] {
    let mut frame = blank_frame(LOOP2_PACKET_TYPE);
    put_i16(&mut frame, 7, 29_921);
    put_i16(&mut frame, 12, 600);
    put_i16(&mut frame, 18, 50);
    put_i16(&mut frame, 20, rng.random_range(30..60));
    put_i16(&mut frame, 22, rng.random_range(8..16));
    put_i16(&mut frame, 24, rng.random_range(200..250));
    put_i16(&mut frame, 30, 48);
    put_i16(&mut frame, 35, 60);
    put_i16(&mut frame, 37, 59);
    put_i16(&mut frame, 39, 62);
    frame[43] = 0xFF;
    put_i16(&mut frame, 44, 32767);
    put_i16(&mut frame, 48, -1);
    put_i16(&mut frame, 65, 29_450);
    seal(&mut frame);
    frame
}

fn truncate_to_minute(time: DateTime) -> DateTime {
    time.with().second(0).subsec_nanosecond(0).build().unwrap_or(time)
}
