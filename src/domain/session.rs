use crate::domain::config::{ErrorPolicy, PollConfig};
use crate::error::{CheckError, PollError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Opaque identifier of the polled resource (order code, account id, ...).
///
/// Passed unchanged to the status check on every attempt. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn new(key: impl Into<String>) -> Result<Self, PollError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(PollError::InvalidResourceKey(
                "resource key must not be empty".to_string(),
            ));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ResourceKey {
    type Error = PollError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ResourceKey {
    type Error = PollError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceKey> for String {
    fn from(key: ResourceKey) -> Self {
        key.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of classifying one status payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Idle,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl PollState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PollState::Succeeded | PollState::Failed | PollState::TimedOut | PollState::Cancelled
        )
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PollState::Idle => "idle",
            PollState::Running => "running",
            PollState::Succeeded => "succeeded",
            PollState::Failed => "failed",
            PollState::TimedOut => "timed_out",
            PollState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// What recording an event did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The session was not running; nothing changed.
    Discarded,
    /// The session changed but observers are not told.
    Silent,
    /// The session changed and observers must see the new snapshot.
    Published,
}

/// Snapshot of one polling run.
///
/// The poller owns the live copy; callers get clones through the session
/// handle. Transitions only ever leave `Running`, so every method below is a
/// no-op on a session that is idle or already terminal (except `begin`).
#[derive(Debug, Clone, PartialEq)]
pub struct PollSession<R> {
    pub id: SessionId,
    pub resource_key: ResourceKey,
    /// Completed checks so far, erroring ones included.
    pub attempt: u32,
    pub max_attempts: u32,
    pub interval: Duration,
    pub state: PollState,
    pub last_result: Option<R>,
    pub last_error: Option<CheckError>,
}

impl<R> PollSession<R> {
    pub fn new(id: SessionId, resource_key: ResourceKey, config: &PollConfig) -> Self {
        Self {
            id,
            resource_key,
            attempt: 0,
            max_attempts: config.max_attempts,
            interval: config.interval(),
            state: PollState::Idle,
            last_result: None,
            last_error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_running(&self) -> bool {
        self.state == PollState::Running
    }

    /// Moves an idle session to `Running`.
    pub fn begin(&mut self) -> Applied {
        if self.state != PollState::Idle {
            return Applied::Discarded;
        }
        self.state = PollState::Running;
        Applied::Published
    }

    /// Records a payload the status check returned.
    pub fn record_result(&mut self, result: R, classification: Classification) -> Applied {
        if !self.is_running() {
            return Applied::Discarded;
        }
        self.attempt += 1;
        self.last_result = Some(result);
        self.state = match classification {
            Classification::Succeeded => PollState::Succeeded,
            Classification::Failed => PollState::Failed,
            Classification::Pending if self.attempts_exhausted() => PollState::TimedOut,
            Classification::Pending => PollState::Running,
        };
        Applied::Published
    }

    /// Records a failed status check according to `policy`.
    pub fn record_error(&mut self, error: CheckError, policy: ErrorPolicy) -> Applied {
        if !self.is_running() {
            return Applied::Discarded;
        }
        self.attempt += 1;
        match policy {
            ErrorPolicy::Retry => {
                self.last_error = Some(error);
                if self.attempts_exhausted() {
                    self.state = PollState::TimedOut;
                }
                Applied::Published
            }
            ErrorPolicy::Ignore => {
                if self.attempts_exhausted() {
                    self.state = PollState::TimedOut;
                    Applied::Published
                } else {
                    Applied::Silent
                }
            }
            ErrorPolicy::Stop => {
                self.last_error = Some(error);
                self.state = PollState::Failed;
                Applied::Published
            }
        }
    }

    pub fn cancel(&mut self) -> Applied {
        if !self.is_running() {
            return Applied::Discarded;
        }
        self.state = PollState::Cancelled;
        Applied::Published
    }

    fn attempts_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}
