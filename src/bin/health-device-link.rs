use clap::Parser;
use log::{error, info};
use health_device_link::cli::Cli;
use health_device_link::config::io::ConfigIO;
use health_device_link::error::{AppRunError, ConfigError};
use health_device_link::{init_logging, load_config, run};

fn main() -> Result<(), AppRunError> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|source| AppRunError::ConfigError { source: ConfigError::IOError { source } })?;

    let config_io = ConfigIO::new_sync()?;
    let (config, config_error) = runtime.block_on(load_config(&config_io));

    init_logging(cli.log_level.unwrap_or(config.log_level_filter()));
    info!(concat!("health-device-link ", env!("CARGO_PKG_VERSION")));
    info!("Using config file {}", config_io.path().display());

    if let Some(err) = config_error {
        error!("Failed to load config, using defaults: {}", err);
    }

    match runtime.block_on(run(cli, config, config_io)) {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            eprintln!("Another health-device-link process is already using the Bluetooth adapter");
            Ok(())
        },
        Err(err) => {
            eprintln!("{}", err);
            Err(err)
        },
        Ok(_) => Ok(()),
    }
}
