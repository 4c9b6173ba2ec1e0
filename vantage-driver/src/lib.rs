pub mod archive;
pub mod config;
pub mod console;
pub mod driver;
pub mod dump;
pub mod error;
pub mod session;
pub mod sink;
pub mod transport;

pub use archive::ArchiveStore;
pub use archive::memory::MemoryArchive;
pub use config::{Config, ConsoleConfig, DriverConfig};
pub use console::Console;
pub use driver::{Driver, DriverHandle};
pub use dump::{ArchiveDump, DumpEvent};
pub use error::StationError;
pub use session::{CurrentWeatherBurst, StationSession};
pub use sink::log::LogSink;
pub use sink::memory::MemorySink;
pub use sink::{Message, Sink};
pub use transport::mock::MockConsole;
pub use transport::{Pacing, Port, Transport};
