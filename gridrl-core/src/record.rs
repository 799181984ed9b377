//! Types for recording training metrics.
//!
//! A [`Record`] is a set of named values produced during training or
//! evaluation. [`Recorder`]s receive records from the trainer; the
//! [`CsvRecorder`] aggregates them and appends rows to an append-only CSV
//! file, the training-history artifact consumed by external reporting.
mod base;
mod csv_recorder;
mod null_recorder;
mod recorder;

pub use base::{Record, RecordValue};
pub use csv_recorder::CsvRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::Recorder;
