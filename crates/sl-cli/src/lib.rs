//! stintlog CLI library.
//!
//! Recording, the summary scheduler, and the offline commands over recorded
//! event logs.

mod cli;
pub mod commands;
mod config;
pub mod scheduler;
pub mod source;

pub use cli::{Cli, Commands, RecordArgs};
pub use config::Config;
