//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Scan for nearby peripherals and list the named ones
    Scan {
        /// How long to scan; defaults to the configured duration
        #[arg(short, long)]
        duration_secs: Option<u64>,
    },
    /// Connect and print the bulb's current state
    Status {
        /// Peripheral id as printed by `scan`
        id: String,
    },
    /// Switch the bulb on or off
    Power {
        id: String,
        #[arg(value_enum)]
        state: PowerArg,
    },
    /// Set the brightness level
    Brightness {
        id: String,
        /// Brightness level (0-255)
        value: u8,
    },
    /// Set the color temperature
    ColorTemp {
        id: String,
        /// Color temperature in mireds (153-500)
        #[arg(value_parser = clap::value_parser!(u16).range(153..=500))]
        value: u16,
    },
    /// Print the bulb's state on every change until Ctrl-C or disconnect
    Watch { id: String },
    /// Print the effective configuration as TOML
    Config {
        /// Also write it to this file
        #[arg(short, long)]
        write: Option<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerArg {
    On,
    Off,
}

impl PowerArg {
    pub fn is_on(self) -> bool {
        self == PowerArg::On
    }
}
