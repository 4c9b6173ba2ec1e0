use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;
use vantage_driver::{Config, ConsoleConfig, DriverConfig};

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn loads_serial_console() {
    let file = write_config(
        r#"
[console]
type = "serial"
port = "/dev/ttyS1"

[driver]
current_weather_cycles = 4
read_timeout_ms = 1500
"#,
    );

    let config = Config::load(file.path()).unwrap();

    assert_eq!(
        config.console,
        ConsoleConfig::Serial {
            port: "/dev/ttyS1".to_owned(),
            baud_rate: 19200,
        }
    );
    assert_eq!(config.driver.current_weather_cycles, 4);
    assert_eq!(config.driver.read_timeout(), Duration::from_millis(1500));
}

#[test]
fn loads_mock_console_with_driver_defaults() {
    let file = write_config(
        r#"
[console]
type = "mock"
archive_records = 20
"#,
    );

    let config = Config::load(file.path()).unwrap();

    assert_eq!(config.console, ConsoleConfig::Mock { archive_records: 20 });
    assert_eq!(config.driver, DriverConfig::default());
    assert_eq!(config.driver.read_timeout(), Duration::from_secs(5));
}

#[test]
fn partial_driver_section_keeps_other_defaults() {
    let file = write_config(
        r#"
[console]
type = "serial"
port = "COM3"
baud_rate = 9600

[driver]
current_weather_cycles = 1
"#,
    );

    let config = Config::load(file.path()).unwrap();

    assert!(matches!(config.console, ConsoleConfig::Serial { baud_rate: 9600, .. }));
    assert_eq!(config.driver.current_weather_cycles, 1);
    assert_eq!(config.driver.read_timeout_ms, 5000);
}

#[test]
fn rejects_unknown_console_type() {
    let file = write_config(
        r#"
[console]
type = "bluetooth"
"#,
    );

    assert!(Config::load(file.path()).is_err());
}

#[test]
fn missing_file_is_an_error() {
    let file = write_config("");
    let path = file.path().to_owned();
    drop(file);

    assert!(Config::load(&path).is_err());
}
