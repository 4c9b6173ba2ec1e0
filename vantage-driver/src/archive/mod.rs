pub mod memory;

use jiff::civil::DateTime;
use vantage_core::ArchiveRecord;

/// Local persistence of downloaded archive records.
/// The newest stored record is where a restarted driver resumes.
pub trait ArchiveStore: Send + 'static {
    /// Error type specific to this store implementation
    type Error: std::error::Error + Send + Sync + 'static;

    /// Timestamp of the newest stored record.
    fn newest_record_time(&self) -> Result<Option<DateTime>, Self::Error>;

    /// Store the records strictly newer than the newest stored one.
    /// Returns how many were stored.
    fn append(&self, records: &[ArchiveRecord]) -> Result<usize, Self::Error>;
}
