//! Application layer driving poll sessions on a tokio runtime.
//!
//! `AsyncStatusPoller` spawns one task per session. The task performs a check,
//! applies the outcome to the session snapshot held in a `watch` channel, and
//! sleeps until the next check unless the session ended.

pub mod poller;
