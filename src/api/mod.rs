//! Public API for hosts embedding the monitor

pub mod monitor_api;

pub use monitor_api::{get_version, init_logging, HttpMonitor};
