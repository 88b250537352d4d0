//! Monitor configuration
//!
//! A `MonitorConfig` is built once per monitored client and shared read-only
//! with the interceptor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::capture::sanitizer::{SanitizedHeader, DEFAULT_PLACEHOLDER};
use crate::interceptor::OutgoingRequest;

/// Inclusion predicate over an outgoing request
pub type RequestFilter = Arc<dyn Fn(&OutgoingRequest<'_>) -> bool + Send + Sync>;

/// Maximum number of body bytes kept per request and per response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ContentLength {
    /// 64 KiB
    #[default]
    Default,
    /// Keep bodies whole
    Full,
    /// Keep at most this many bytes
    Bytes(usize),
}

impl ContentLength {
    pub const DEFAULT_BYTES: usize = 64 * 1024;

    /// Byte cap, or `None` when unlimited
    pub fn limit(&self) -> Option<usize> {
        match self {
            ContentLength::Default => Some(Self::DEFAULT_BYTES),
            ContentLength::Full => None,
            ContentLength::Bytes(n) => Some(*n),
        }
    }
}

/// How long call records are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RetentionPeriod {
    Forever,
    #[default]
    OneHour,
    OneDay,
    OneWeek,
    /// 30 days
    OneMonth,
}

impl RetentionPeriod {
    /// Maximum record age, `None` for `Forever`
    pub fn duration(&self) -> Option<Duration> {
        const HOUR: u64 = 60 * 60;
        match self {
            RetentionPeriod::Forever => None,
            RetentionPeriod::OneHour => Some(Duration::from_secs(HOUR)),
            RetentionPeriod::OneDay => Some(Duration::from_secs(24 * HOUR)),
            RetentionPeriod::OneWeek => Some(Duration::from_secs(7 * 24 * HOUR)),
            RetentionPeriod::OneMonth => Some(Duration::from_secs(30 * 24 * HOUR)),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("sanitization rule #{index} has an empty placeholder")]
    EmptyPlaceholder { index: usize },
    #[error("max content length must be greater than zero")]
    ZeroContentLength,
}

/// Immutable monitor configuration
#[derive(Clone)]
pub struct MonitorConfig {
    sanitized_headers: Vec<SanitizedHeader>,
    filter: Option<RequestFilter>,
    max_content_length: ContentLength,
    retention_period: RetentionPeriod,
    show_notification: bool,
}

impl MonitorConfig {
    pub fn builder() -> MonitorConfigBuilder {
        MonitorConfigBuilder::default()
    }

    pub fn sanitized_headers(&self) -> &[SanitizedHeader] {
        &self.sanitized_headers
    }

    /// Whether a request should be tracked; everything is tracked without a filter
    pub fn is_tracked(&self, request: &OutgoingRequest<'_>) -> bool {
        self.filter.as_ref().map(|f| f(request)).unwrap_or(true)
    }

    pub fn max_content_length(&self) -> ContentLength {
        self.max_content_length
    }

    pub fn retention_period(&self) -> RetentionPeriod {
        self.retention_period
    }

    pub fn show_notification(&self) -> bool {
        self.show_notification
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sanitized_headers: Vec::new(),
            filter: None,
            max_content_length: ContentLength::Default,
            retention_period: RetentionPeriod::default(),
            show_notification: false,
        }
    }
}

impl fmt::Debug for MonitorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorConfig")
            .field("sanitized_headers", &self.sanitized_headers.len())
            .field("filter", &self.filter.is_some())
            .field("max_content_length", &self.max_content_length)
            .field("retention_period", &self.retention_period)
            .field("show_notification", &self.show_notification)
            .finish()
    }
}

#[derive(Default)]
pub struct MonitorConfigBuilder {
    config: MonitorConfig,
}

impl MonitorConfigBuilder {
    /// Redact headers whose name matches `predicate` with `***`
    pub fn sanitize_header<P>(self, predicate: P) -> Self
    where
        P: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.sanitize_header_with(DEFAULT_PLACEHOLDER, predicate)
    }

    /// Redact headers whose name matches `predicate` with `placeholder`
    pub fn sanitize_header_with<P>(mut self, placeholder: impl Into<String>, predicate: P) -> Self
    where
        P: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.config
            .sanitized_headers
            .push(SanitizedHeader::new(placeholder, predicate));
        self
    }

    /// Track only requests for which `predicate` returns true
    pub fn filter<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&OutgoingRequest<'_>) -> bool + Send + Sync + 'static,
    {
        self.config.filter = Some(Arc::new(predicate));
        self
    }

    pub fn max_content_length(mut self, max: ContentLength) -> Self {
        self.config.max_content_length = max;
        self
    }

    pub fn retention_period(mut self, period: RetentionPeriod) -> Self {
        self.config.retention_period = period;
        self
    }

    pub fn show_notification(mut self, show: bool) -> Self {
        self.config.show_notification = show;
        self
    }

    pub fn build(self) -> Result<MonitorConfig, ConfigError> {
        if let Some(index) = self
            .config
            .sanitized_headers
            .iter()
            .position(|rule| rule.placeholder().is_empty())
        {
            return Err(ConfigError::EmptyPlaceholder { index });
        }
        if self.config.max_content_length == ContentLength::Bytes(0) {
            return Err(ConfigError::ZeroContentLength);
        }
        Ok(self.config)
    }
}
