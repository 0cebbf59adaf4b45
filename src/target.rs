//! NDJSON target
//!
//! [`Target`] interprets tap output one line at a time: SCHEMA messages
//! (re)declare a stream's validator, RECORD messages are validated and
//! appended to the stream's output file, and STATE messages update the
//! checkpoint that is echoed when the run ends.

use std::io::{BufRead, Write};

use serde_json::Value;
use tracing::debug;

use crate::config::TargetConfig;
use crate::error::{Result, TargetError};
use crate::message::{decode_line, Message, RecordMessage, SchemaMessage};
use crate::stream::{SessionStamp, StreamRegistry};

/// A single target session
pub struct Target {
    streams: StreamRegistry,
    state: Option<Value>,
}

impl Target {
    /// Start a session writing into the configured destination
    pub fn new(config: &TargetConfig) -> Self {
        Self::with_stamp(config, SessionStamp::now())
    }

    pub fn with_stamp(config: &TargetConfig, stamp: SessionStamp) -> Self {
        Self {
            streams: StreamRegistry::new(config.output_dir(), stamp),
            state: None,
        }
    }

    pub fn streams(&self) -> &StreamRegistry {
        &self.streams
    }

    /// The latest checkpoint, if one is pending
    pub fn state(&self) -> Option<&Value> {
        self.state.as_ref()
    }

    /// Apply one typed message
    pub fn process_message(&mut self, message: Message) -> Result<()> {
        debug!(message_type = message.message_type(), "processing message");
        match message {
            Message::Schema(SchemaMessage {
                stream,
                schema,
                key_properties,
                bookmark_properties,
            }) => self
                .streams
                .declare_schema(&stream, schema, key_properties, bookmark_properties),
            Message::Record(record) => self.process_record(record),
            Message::State(state) => {
                self.state = Some(state.value);
                Ok(())
            }
        }
    }

    fn process_record(&mut self, message: RecordMessage) -> Result<()> {
        self.streams
            .validator_for(&message.stream)?
            .validate(&message.record)?;

        self.streams
            .output_for(&message.stream)?
            .write_record(&message.record)?;

        // The checkpoint read before this record no longer covers everything written.
        self.state = None;
        Ok(())
    }

    /// Decode and apply one line of tap output
    pub fn process_line(&mut self, line: &str) -> Result<()> {
        let raw = decode_line(line)?;
        self.process_message(Message::from_raw(raw)?)
    }

    /// Run the session over `lines`, returning the final checkpoint.
    ///
    /// Output files are closed whether the session succeeds or not. Any
    /// failure aborts the session and is returned wrapped in
    /// [`TargetError::Aborted`].
    pub fn persist_lines<I, S>(mut self, lines: I) -> Result<Option<Value>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for (index, line) in lines.into_iter().enumerate() {
            if let Err(e) = self.process_line(line.as_ref()) {
                self.streams.close_all();
                return Err(TargetError::aborted(index + 1, e));
            }
        }
        self.finish()
    }

    /// Run the session over every line of `reader`
    pub fn persist_reader<R: BufRead>(mut self, reader: R) -> Result<Option<Value>> {
        for (index, line) in reader.lines().enumerate() {
            let result = line
                .map_err(TargetError::from)
                .and_then(|line| self.process_line(&line));
            if let Err(e) = result {
                self.streams.close_all();
                return Err(TargetError::aborted(index + 1, e));
            }
        }
        self.finish()
    }

    fn finish(mut self) -> Result<Option<Value>> {
        self.streams.close_all();
        debug!(streams = self.streams.len(), "tap output exhausted");
        Ok(self.state.take().filter(|value| !is_empty_checkpoint(value)))
    }
}

/// Checkpoints that carry no progress: `null`, `false`, zero, `""`, `[]` and `{}`
pub fn is_empty_checkpoint(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Write the final checkpoint as one JSON line, if there is one
pub fn emit_state<W: Write>(state: Option<&Value>, mut out: W) -> Result<()> {
    if let Some(value) = state {
        serde_json::to_writer(&mut out, value)?;
        out.write_all(b"\n")?;
        out.flush()?;
    }
    Ok(())
}
