use crate::domain::session::{PollSession, PollState};
use crate::error::Result;
use serde::Serialize;
use serde_json::Value;
use std::io::Write;

/// One row of the transition log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionRecord {
    pub resource: String,
    pub attempt: u32,
    pub max_attempts: u32,
    pub state: PollState,
    pub status: Option<String>,
    pub error: Option<String>,
}

impl TransitionRecord {
    pub fn from_session<R>(session: &PollSession<R>, status: Option<String>) -> Self {
        Self {
            resource: session.resource_key.to_string(),
            attempt: session.attempt,
            max_attempts: session.max_attempts,
            state: session.state,
            status,
            error: session.last_error.as_ref().map(ToString::to_string),
        }
    }

    /// Builds a record from a JSON-payload session, reading the status
    /// string at `field` of the last result.
    pub fn from_json_session(session: &PollSession<Value>, field: &str) -> Self {
        let status = session
            .last_result
            .as_ref()
            .and_then(|payload| payload.get(field))
            .and_then(Value::as_str)
            .map(str::to_string);
        Self::from_session(session, status)
    }
}

/// Writes session transitions as CSV, one row per record.
///
/// Each row is flushed immediately so the log can be tailed while a session
/// is still running.
pub struct TransitionWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> TransitionWriter<W> {
    pub fn new(sink: W) -> Self {
        let writer = csv::WriterBuilder::new().has_headers(true).from_writer(sink);
        Self { writer }
    }

    pub fn write(&mut self, record: &TransitionRecord) -> Result<()> {
        self.writer.serialize(record)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()).into())
    }
}
