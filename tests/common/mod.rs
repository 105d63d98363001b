#![allow(dead_code)]

use status_poller::application::poller::PollOptions;
use status_poller::domain::classifiers::classify_payment;
use status_poller::domain::config::{ErrorPolicy, PollConfig};
use status_poller::domain::session::ResourceKey;
use status_poller::error::CheckError;
use status_poller::infrastructure::in_memory::ScriptedStatusSource;
use std::path::Path;

pub type Status = &'static str;

pub fn key(k: &str) -> ResourceKey {
    ResourceKey::new(k).unwrap()
}

/// Payment-style options over a scripted source.
pub fn payment_options(
    source: &ScriptedStatusSource<Status>,
    interval_ms: u64,
    max_attempts: u32,
    policy: ErrorPolicy,
) -> PollOptions<Status> {
    PollOptions::new(
        source.clone(),
        |status: &Status| classify_payment(status),
        PollConfig::new(interval_ms, max_attempts).with_error_policy(policy),
    )
    .unwrap()
}

/// A source answering `PENDING` forever.
pub fn always_pending() -> ScriptedStatusSource<Status> {
    ScriptedStatusSource::new().with_fallback(Ok("PENDING"))
}

/// A source whose every check fails at the transport level.
pub fn always_erroring() -> ScriptedStatusSource<Status> {
    ScriptedStatusSource::new().with_fallback(Err(CheckError::Transport(
        "503 Service Unavailable".to_string(),
    )))
}

pub fn write_status(root: &Path, key: &str, body: &str) {
    std::fs::write(root.join(format!("{key}.json")), body).unwrap();
}
