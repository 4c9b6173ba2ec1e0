use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use vantage_driver::{
    Config, ConsoleConfig, Driver, LogSink, MemoryArchive, MockConsole, Pacing, StationSession,
    Transport,
};

#[derive(Parser)]
#[command(name = "vantage-driver")]
#[command(about = "Davis Vantage Pro 2 console driver")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "vantage-driver.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "vantage_driver=info,vantage_core=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    let read_timeout = config.driver.read_timeout();
    let transport = match &config.console {
        ConsoleConfig::Serial { port, baud_rate } => {
            info!(port = %port, baud_rate, "Using serial console");
            match Transport::open(port, *baud_rate, read_timeout) {
                Ok(transport) => transport,
                Err(e) => {
                    error!(error = %e, "Failed to open console port");
                    std::process::exit(e.exit_code());
                }
            }
        }
        ConsoleConfig::Mock { archive_records } => {
            info!(archive_records, "Using simulated console");
            Transport::new(
                MockConsole::simulated(*archive_records),
                read_timeout,
                Pacing::CONSOLE,
            )
        }
    };

    let session = match StationSession::start(transport) {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "Failed to start console session");
            std::process::exit(e.exit_code());
        }
    };

    let driver = Driver::new(
        session,
        LogSink::new(),
        MemoryArchive::default(),
        config.driver.current_weather_cycles,
    );
    let handle = driver.start()?;
    info!("Started vantage-driver");

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down...");

    let stopped = tokio::task::spawn_blocking(move || handle.stop()).await?;
    if stopped.is_err() {
        error!("Driver worker panicked");
    }

    info!("vantage-driver shut down complete");
    Ok(())
}
