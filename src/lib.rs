//! # HTTP Monitor
//!
//! Client-side HTTP traffic monitor. Wraps a `reqwest::Client`, records every
//! outgoing call with redacted headers and size-capped bodies, and keeps the
//! records in SQLite for list/detail screens and exports.
//!
//! ## Features
//!
//! - Header sanitization with ordered, first-match-wins rules
//! - Request/response body capping with original length tracking
//! - Pending → completed call records, cancellation included
//! - Age-based retention
//! - Export as text transcript, cURL, wget or bare URL
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Host application (reqwest calls)            │
//! ├─────────────────────────────────────────────────────────┤
//! │                MonitoredClient (reqwest)                 │
//! ├─────────────────────────────────────────────────────────┤
//! │                   HTTP Monitor (Rust)                    │
//! │  ┌─────────────┐  ┌──────────┐  ┌─────────────────────┐  │
//! │  │ Interceptor │──│ Capture  │──│  CallStore (SQLite) │  │
//! │  └─────────────┘  └──────────┘  └─────────────────────┘  │
//! │        Retention sweeper · Exports · Monitor API         │
//! └─────────────────────────────────────────────────────────┘
//! ```

// Public modules
pub mod api;
pub mod capture;
pub mod config;
pub mod export;
pub mod interceptor;
pub mod models;
pub mod retention;
pub mod storage;

pub use api::HttpMonitor;
pub use config::{ConfigError, ContentLength, MonitorConfig, RetentionPeriod};
pub use export::ExportFormat;
pub use interceptor::MonitoredClient;
pub use models::{CallFilter, CallRecord, CallState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
