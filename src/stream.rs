//! Stream Registry
//!
//! Tracks the current validator, key properties and output file of every
//! stream seen during a session.

use std::collections::HashMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{Result, TargetError};

/// Batch identifier shared by every output file of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStamp(String);

impl SessionStamp {
    pub const FORMAT: &'static str = "%Y%m%dT%H%M%S";

    /// Stamp for the current local time
    pub fn now() -> Self {
        Self::at(Local::now())
    }

    pub fn at<Tz>(time: DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        Self(time.format(Self::FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Path of the output file for `stream`: `{dir}/{stream}_{stamp}.ndjson`
pub fn output_path(dir: &Path, stream: &str, stamp: &SessionStamp) -> PathBuf {
    dir.join(format!("{}_{}.ndjson", stream, stamp.as_str()))
}

/// An open, append-only NDJSON file
pub struct OutputFile {
    path: PathBuf,
    writer: BufWriter<File>,
    records_written: u64,
}

impl OutputFile {
    /// Create (truncating) the file at `path`
    pub fn create(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            records_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Serialize `record` as one line and flush it to the file
    pub fn write_record(&mut self, record: &Value) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.records_written += 1;
        Ok(())
    }

    fn close(mut self) -> std::io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }
}

/// Everything known about one stream
pub struct StreamEntry {
    pub name: String,
    pub validator: JSONSchema,
    pub key_properties: Vec<String>,
    pub bookmark_properties: Option<Vec<String>>,
    output: Option<OutputFile>,
}

impl StreamEntry {
    /// Validate `record` against the current schema
    pub fn validate(&self, record: &Value) -> Result<()> {
        if let Err(errors) = self.validator.validate(record) {
            let errors = errors
                .map(|e| {
                    let ptr = e.instance_path.to_string();
                    if ptr.is_empty() {
                        e.to_string()
                    } else {
                        format!("{}: {}", ptr, e)
                    }
                })
                .collect();
            return Err(TargetError::Validation {
                stream: self.name.clone(),
                errors,
            });
        }
        Ok(())
    }

    pub fn output(&self) -> Option<&OutputFile> {
        self.output.as_ref()
    }
}

/// Compile a schema the way Singer taps expect it to be read (Draft 4)
pub fn compile_schema(stream: &str, schema: &Value) -> Result<JSONSchema> {
    JSONSchema::options()
        .with_draft(Draft::Draft4)
        .compile(schema)
        .map_err(|e| TargetError::InvalidSchema {
            stream: stream.to_string(),
            reason: e.to_string(),
        })
}

/// All streams of a session, keyed by name
pub struct StreamRegistry {
    output_dir: PathBuf,
    stamp: SessionStamp,
    streams: HashMap<String, StreamEntry>,
}

impl StreamRegistry {
    pub fn new(output_dir: impl Into<PathBuf>, stamp: SessionStamp) -> Self {
        Self {
            output_dir: output_dir.into(),
            stamp,
            streams: HashMap::new(),
        }
    }

    pub fn stamp(&self) -> &SessionStamp {
        &self.stamp
    }

    pub fn get(&self, stream: &str) -> Option<&StreamEntry> {
        self.streams.get(stream)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Create or replace the validator and key properties of `stream`.
    ///
    /// An output file already open for the stream is kept.
    pub fn declare_schema(
        &mut self,
        stream: &str,
        schema: Value,
        key_properties: Vec<String>,
        bookmark_properties: Option<Vec<String>>,
    ) -> Result<()> {
        let validator = compile_schema(stream, &schema)?;

        match self.streams.get_mut(stream) {
            Some(entry) => {
                debug!(stream, "replacing schema");
                entry.validator = validator;
                entry.key_properties = key_properties;
                entry.bookmark_properties = bookmark_properties;
            }
            None => {
                debug!(stream, "registering schema");
                self.streams.insert(
                    stream.to_string(),
                    StreamEntry {
                        name: stream.to_string(),
                        validator,
                        key_properties,
                        bookmark_properties,
                        output: None,
                    },
                );
            }
        }
        Ok(())
    }

    /// The entry for `stream`, failing if no schema was declared for it
    pub fn validator_for(&self, stream: &str) -> Result<&StreamEntry> {
        self.streams
            .get(stream)
            .ok_or_else(|| TargetError::MissingSchema {
                stream: stream.to_string(),
            })
    }

    /// The output file for `stream`, opened on first use
    pub fn output_for(&mut self, stream: &str) -> Result<&mut OutputFile> {
        let entry = self
            .streams
            .get_mut(stream)
            .ok_or_else(|| TargetError::MissingSchema {
                stream: stream.to_string(),
            })?;

        let output = match entry.output.take() {
            Some(output) => output,
            None => {
                let path = output_path(&self.output_dir, stream, &self.stamp);
                debug!(stream, path = %path.display(), "opening output file");
                OutputFile::create(path)?
            }
        };

        Ok(entry.output.insert(output))
    }

    /// Close every open output file.
    ///
    /// Close failures are logged and the remaining files are still closed.
    /// Calling this again is a no-op.
    pub fn close_all(&mut self) {
        for entry in self.streams.values_mut() {
            let Some(output) = entry.output.take() else {
                continue;
            };
            let path = output.path().to_path_buf();
            let records = output.records_written();
            match output.close() {
                Ok(()) => debug!(stream = %entry.name, records, path = %path.display(), "closed output file"),
                Err(e) => error!(stream = %entry.name, path = %path.display(), "failed to close output file: {}", e),
            }
        }
    }
}

impl Drop for StreamRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::tempdir;

    fn stamp() -> SessionStamp {
        SessionStamp::at(Utc.with_ymd_and_hms(2020, 7, 5, 13, 4, 9).unwrap())
    }

    fn email_schema() -> Value {
        json!({"properties": {"email": {"type": "string"}}})
    }

    #[test]
    fn test_session_stamp_format() {
        assert_eq!(stamp().as_str(), "20200705T130409");
    }

    #[test]
    fn test_output_path() {
        let path = output_path(Path::new("/data"), "orders", &stamp());
        assert_eq!(path, PathBuf::from("/data/orders_20200705T130409.ndjson"));
    }

    #[test]
    fn test_validator_for_unknown_stream() {
        let dir = tempdir().unwrap();
        let registry = StreamRegistry::new(dir.path(), stamp());
        assert!(matches!(
            registry.validator_for("orders"),
            Err(TargetError::MissingSchema { .. })
        ));
    }

    #[test]
    fn test_declare_schema_opens_nothing() {
        let dir = tempdir().unwrap();
        let mut registry = StreamRegistry::new(dir.path(), stamp());
        registry
            .declare_schema("orders", email_schema(), vec!["email".to_string()], None)
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.get("orders").unwrap().output().is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_redeclare_replaces_validator() {
        let dir = tempdir().unwrap();
        let mut registry = StreamRegistry::new(dir.path(), stamp());
        registry
            .declare_schema("orders", email_schema(), vec![], None)
            .unwrap();
        let record = json!({"email": 7});
        assert!(registry.validator_for("orders").unwrap().validate(&record).is_err());

        registry
            .declare_schema(
                "orders",
                json!({"properties": {"email": {"type": "integer"}}}),
                vec!["email".to_string()],
                None,
            )
            .unwrap();
        let entry = registry.validator_for("orders").unwrap();
        assert!(entry.validate(&record).is_ok());
        assert_eq!(entry.key_properties, vec!["email"]);
    }

    #[test]
    fn test_invalid_schema_is_rejected() {
        let dir = tempdir().unwrap();
        let mut registry = StreamRegistry::new(dir.path(), stamp());
        let result = registry.declare_schema("orders", json!({"type": 12}), vec![], None);
        assert!(matches!(result, Err(TargetError::InvalidSchema { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_output_is_opened_once() {
        let dir = tempdir().unwrap();
        let mut registry = StreamRegistry::new(dir.path(), stamp());
        registry
            .declare_schema("orders", email_schema(), vec![], None)
            .unwrap();

        registry
            .output_for("orders")
            .unwrap()
            .write_record(&json!({"email": "a@b.com"}))
            .unwrap();
        registry
            .declare_schema("orders", email_schema(), vec![], None)
            .unwrap();
        registry
            .output_for("orders")
            .unwrap()
            .write_record(&json!({"email": "c@d.com"}))
            .unwrap();
        assert_eq!(registry.get("orders").unwrap().output().unwrap().records_written(), 2);

        registry.close_all();
        registry.close_all();

        let content =
            std::fs::read_to_string(output_path(dir.path(), "orders", &stamp())).unwrap();
        assert_eq!(content, "{\"email\":\"a@b.com\"}\n{\"email\":\"c@d.com\"}\n");
    }

    #[test]
    fn test_close_all_continues_past_failures() {
        let dir = tempdir().unwrap();
        let mut registry = StreamRegistry::new(dir.path(), stamp());
        for stream in ["broken", "orders"] {
            registry
                .declare_schema(stream, email_schema(), vec![], None)
                .unwrap();
        }
        registry
            .output_for("orders")
            .unwrap()
            .write_record(&json!({"email": "a@b.com"}))
            .unwrap();

        // A read-only handle with buffered bytes fails its final flush.
        let broken_path = dir.path().join("broken.ndjson");
        std::fs::write(&broken_path, "").unwrap();
        let mut broken = OutputFile {
            path: broken_path.clone(),
            writer: BufWriter::new(File::open(&broken_path).unwrap()),
            records_written: 0,
        };
        broken.writer.write_all(b"{}\n").unwrap();
        registry.streams.get_mut("broken").unwrap().output = Some(broken);

        registry.close_all();

        assert!(registry.get("broken").unwrap().output().is_none());
        assert!(registry.get("orders").unwrap().output().is_none());
        let content =
            std::fs::read_to_string(output_path(dir.path(), "orders", &stamp())).unwrap();
        assert_eq!(content, "{\"email\":\"a@b.com\"}\n");

        registry.close_all();
    }

    #[test]
    fn test_validation_error_names_stream_and_path() {
        let dir = tempdir().unwrap();
        let mut registry = StreamRegistry::new(dir.path(), stamp());
        registry
            .declare_schema("orders", email_schema(), vec![], None)
            .unwrap();

        match registry
            .validator_for("orders")
            .unwrap()
            .validate(&json!({"email": 1}))
        {
            Err(TargetError::Validation { stream, errors }) => {
                assert_eq!(stream, "orders");
                assert_eq!(errors.len(), 1);
                assert!(errors[0].starts_with("/email: "), "{}", errors[0]);
            }
            other => panic!("Expected Validation, got {:?}", other.err()),
        }
    }
}
