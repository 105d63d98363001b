//! Domain layer: the poll session state machine and the ports it is driven
//! through. Nothing in here knows about timers or runtimes.

pub mod classifiers;
pub mod config;
pub mod ports;
pub mod session;
