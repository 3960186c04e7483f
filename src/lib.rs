use std::env;
use log::{info, warn};
use uuid::Uuid;

use crate::cli::{Cli, Command};
use crate::config::io::ConfigIO;
use crate::config::types::Config;
use crate::device::btle::BtleplugPlatform;
use crate::device::connection::DeviceLink;
use crate::device::constants::uuid_from_u16;
use crate::device::parse::parse_characteristic_data;
use crate::device::types::HealthSample;
use crate::error::{AppRunError, ConfigError};

pub mod cli;
pub mod config;
pub mod device;
pub mod error;

pub fn init_logging(level: log::LevelFilter) {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(
            fern::log_file(log_file).expect("Failed to open LOG_FILE")
        );
    }

    dispatch.apply().expect("Failed to initialize logger");
}

/// Accepts a 16-bit assigned number in hex ("2a37") or a full UUID.
pub fn parse_uuid_arg(value: &str) -> Result<Uuid, uuid::Error> {
    if value.len() <= 4 {
        if let Ok(short) = u16::from_str_radix(value, 16) {
            return Ok(uuid_from_u16(short));
        }
    }

    Uuid::parse_str(value)
}

fn print_sample(sample: &HealthSample) {
    match serde_json::to_string(sample) {
        Ok(line) => println!("{}", line),
        Err(err) => warn!("Failed to encode sample: {}", err),
    }
}

async fn discover(config: &Config) -> Result<(), AppRunError> {
    let link = DeviceLink::new(BtleplugPlatform::new(config.scan_duration()).await);

    for record in link.discover_devices().await? {
        println!("{}", serde_json::to_string_pretty(&record)?);
    }

    Ok(())
}

async fn watch(config: &Config, config_io: &ConfigIO) -> Result<(), AppRunError> {
    // only one process may drive the adapter
    let mut locker = config_io.locker()?;
    let _guard = locker.lock()?;

    let link = DeviceLink::new(BtleplugPlatform::new(config.scan_duration()).await);

    let record = match link.discover_devices().await?.into_iter().next() {
        Some(record) => record,
        None => return Err(AppRunError::NothingDiscovered),
    };

    link.add_data_listener(&record.id, print_sample);

    let record = link.connect_to_device(&record.id).await?;
    info!("Watching {} ({}, {}); data types {:?}", record.name, record.brand, record.device_type, record.data_types);

    let signal = tokio::signal::ctrl_c().await;

    info!("Disconnecting");
    link.disconnect_all().await;

    signal.map_err(|source| AppRunError::Signal { source })
}

fn parse(uuid: &str, payload: &str) -> Result<(), AppRunError> {
    let uuid = parse_uuid_arg(uuid)?;
    let value = hex::decode(payload)?;

    match parse_characteristic_data(&uuid, &value) {
        Some(sample) => println!("{}", serde_json::to_string_pretty(&sample)?),
        None => println!("No health data in characteristic {}", uuid),
    }

    Ok(())
}

/// Reads the config, falling back to the defaults. A failure other than a
/// missing file is handed back so it can be reported once logging is up.
pub async fn load_config(config_io: &ConfigIO) -> (Config, Option<ConfigError>) {
    match config_io.read().await {
        Ok(config) => (config, None),
        Err(err) if err.is_file_not_found_error() => (Config::default(), None),
        Err(err) => (Config::default(), Some(err)),
    }
}

pub async fn run(cli: Cli, config: Config, config_io: ConfigIO) -> Result<(), AppRunError> {
    match cli.command {
        Command::Discover => discover(&config).await,
        Command::Watch => watch(&config, &config_io).await,
        Command::Parse { uuid, payload } => parse(&uuid, &payload),
    }
}
