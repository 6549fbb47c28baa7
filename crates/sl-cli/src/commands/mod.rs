//! CLI subcommand implementations.

pub mod events;
pub mod rebuild;
pub mod record;
pub mod summarize;
