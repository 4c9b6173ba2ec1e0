use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use jiff::civil::DateTime;
use vantage_core::ArchiveRecord;

use super::ArchiveStore;

/// In-memory archive store.
/// Used by the binary when no persistent store is configured, and by tests.
#[derive(Clone, Default)]
pub struct MemoryArchive {
    records: Arc<Mutex<Vec<ArchiveRecord>>>,
}

/// Error type for MemoryArchive
#[derive(Debug)]
pub enum MemoryArchiveError {
    MutexPoisoned(String),
}

impl std::error::Error for MemoryArchiveError {}

impl fmt::Display for MemoryArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryArchiveError::MutexPoisoned(msg) => write!(f, "Mutex poisoned: {}", msg),
        }
    }
}

impl<T> From<PoisonError<T>> for MemoryArchiveError {
    fn from(err: PoisonError<T>) -> Self {
        MemoryArchiveError::MutexPoisoned(err.to_string())
    }
}

impl MemoryArchive {
    pub fn len(&self) -> Result<usize, MemoryArchiveError> {
        Ok(self.records.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, MemoryArchiveError> {
        Ok(self.records.lock()?.is_empty())
    }

    /// Timestamps of all stored records, oldest first.
    pub fn times(&self) -> Result<Vec<DateTime>, MemoryArchiveError> {
        Ok(self.records.lock()?.iter().map(|r| r.time).collect())
    }
}

impl ArchiveStore for MemoryArchive {
    type Error = MemoryArchiveError;

    fn newest_record_time(&self) -> Result<Option<DateTime>, Self::Error> {
        Ok(self.records.lock()?.last().map(|r| r.time))
    }

    fn append(&self, records: &[ArchiveRecord]) -> Result<usize, Self::Error> {
        let mut stored = self.records.lock()?;
        let mut newest = stored.last().map(|r| r.time);
        let mut count = 0;

        for record in records {
            if newest.is_some_and(|n| record.time <= n) {
                continue;
            }
            newest = Some(record.time);
            stored.push(record.clone());
            count += 1;
        }

        Ok(count)
    }
}
