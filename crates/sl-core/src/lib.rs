//! Core domain logic for stintlog.
//!
//! This crate contains the fundamental types and logic for:
//! - Detection: turning raw telemetry snapshots into discrete events
//! - Reconstruction: rebuilding sessions, stints and laps from an event log
//! - Summaries: aggregating a reconstructed log into the per-file document

pub mod detector;
pub mod event;
pub mod reconstruct;
pub mod snapshot;
pub mod summary;
pub mod units;

pub use detector::{Detector, DetectorConfig, DetectorState, Tick};
pub use event::{Event, EventKind, WeatherReport};
pub use reconstruct::{
    Lap, ReconstructConfig, Reconstructor, Session, Stint, StintClass, reconstruct,
};
pub use snapshot::Snapshot;
pub use summary::{SummaryDocument, summarize};
