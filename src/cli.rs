use clap::{Parser, Subcommand};
use log::LevelFilter;

#[derive(Debug, Parser)]
#[command(name = "health-device-link", version, about = "Connects to Bluetooth health peripherals and prints their readings")]
pub struct Cli {
    /// Overrides the log level from the config file (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<LevelFilter>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan for a health device and print what was found
    Discover,

    /// Discover and connect to a health device, then print every reading until Ctrl-C
    Watch,

    /// Decode a characteristic value
    Parse {
        /// 16-bit assigned number (e.g. 2a37) or full characteristic UUID
        uuid: String,

        /// The raw value as hex (e.g. 0148)
        payload: String,
    },
}
