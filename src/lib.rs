//! Poll a remote status until it settles.
//!
//! Payment confirmation, bank-account verification, eKYC and QR check-in all
//! follow the same loop: ask the backend for a status every few seconds until
//! it reports a terminal outcome or the attempt budget runs out. This crate
//! implements that loop once, as [`application::poller::AsyncStatusPoller`].

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
pub mod logging;
