use thiserror::Error;

/// Errors raised while configuring or running the poller outside of a check.
#[derive(Error, Debug)]
pub enum PollError {
    #[error("Invalid resource key: {0}")]
    InvalidResourceKey(String),
    #[error("Invalid poll configuration: {0}")]
    InvalidConfig(String),
    #[error("No tokio runtime available to drive poll sessions")]
    NoRuntime,
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

/// A single status check that did not produce a payload.
///
/// These are infrastructure failures, never domain outcomes. They are kept on
/// the session as `last_error` and handled according to the session's
/// `ErrorPolicy`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("status not found: {0}")]
    NotFound(String),
    #[error("malformed status payload: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, PollError>;
