//! bulblink CLI library
//!
//! Argument parsing, layered configuration and the command handlers behind
//! the `bulblink` binary. The handlers are generic over the transport so
//! they can be driven by the in-memory mock as well as by btleplug.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::{Cli, Commands, PowerArg};
pub use commands::CommandDispatcher;
pub use config::{AppConfig, ConfigError};
pub use error::{CliError, Result};
