//! Singer NDJSON Target
//!
//! Reads Singer tap output (one JSON message per line) and writes every
//! validated record to a per-stream newline-delimited JSON file.
//!
//! ## Protocol
//!
//! - `SCHEMA` declares the JSON Schema of a stream, replacing any earlier one
//! - `RECORD` is validated against its stream's schema and appended to
//!   `{stream}_{YYYYMMDDTHHMMSS}.ndjson`
//! - `STATE` carries an opaque checkpoint, echoed to stdout when the run ends
//!
//! ```text
//! tap | target-ndjson --config config.json > state.json
//! ```

pub mod config;
pub mod error;
pub mod message;
pub mod stream;
pub mod target;
pub mod usage;

pub use config::TargetConfig;
pub use error::{Result, TargetError};
pub use message::{decode_line, Message, RawMessage};
pub use stream::{SessionStamp, StreamEntry, StreamRegistry};
pub use target::{emit_state, Target};
pub use usage::spawn_usage_report;
