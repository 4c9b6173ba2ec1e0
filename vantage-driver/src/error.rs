use vantage_core::ProtocolError;

#[derive(Debug, thiserror::Error)]
pub enum StationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Timed out waiting for {expected} bytes, received {received}")]
    TransportTimeout { expected: usize, received: usize },

    #[error("Console did not wake up")]
    WakeupFailed,

    #[error("Command {command:?} was not acknowledged")]
    NotAcknowledged { command: String },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Archive page {page} failed after {attempts} attempts")]
    ProtocolExhausted { page: u16, attempts: usize },

    #[error("Failed to read {what} from the console: {source}")]
    Configuration {
        what: &'static str,
        #[source]
        source: Box<StationError>,
    },
}

impl StationError {
    /// Process exit code for errors that stop the driver during startup.
    pub fn exit_code(&self) -> i32 {
        match self {
            StationError::Configuration { .. } => 2,
            _ => 1,
        }
    }

    pub(crate) fn configuration(what: &'static str) -> impl FnOnce(StationError) -> StationError {
        move |source| StationError::Configuration {
            what,
            source: Box::new(source),
        }
    }
}
