//! HTTP call record model
//!
//! Represents a single HTTP request/response pair captured by the monitor.

use chrono::{Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::content_type::{ContentFormat, ContentType};
use super::headers::Headers;

/// Protocol assumed when the transport did not report one
pub const DEFAULT_PROTOCOL: &str = "HTTP/1.1";

/// State of a captured call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    /// Request captured, no response or failure yet
    Pending,
    /// Response or failure captured; the record is terminal
    Completed,
}

/// One persisted HTTP call attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Unique identifier, stable for the lifetime of the call
    pub id: String,

    /// When the request was dispatched (milliseconds since epoch)
    pub request_timestamp: i64,
    /// HTTP method (e.g., "GET")
    pub method: String,
    /// Full request URL
    pub url: String,
    /// HTTP version (e.g., "HTTP/1.1"), once known
    pub protocol: Option<String>,

    // Request data
    /// Request headers after sanitization
    pub request_headers: Headers,
    /// Request content type
    pub request_content_type: Option<String>,
    /// Request body after size capping
    pub request_body: Option<Vec<u8>>,
    /// Whether the request body exceeded the cap
    pub is_request_body_truncated: bool,
    /// Original (pre-truncation) request body length
    pub request_content_length: u64,

    // Response data
    /// When the response or failure was captured (milliseconds since epoch)
    pub response_timestamp: Option<i64>,
    /// HTTP status code
    pub response_code: Option<u16>,
    /// Response content type
    pub response_content_type: Option<String>,
    /// Response headers after sanitization
    pub response_headers: Option<Headers>,
    /// Response body after size capping
    pub response_body: Option<Vec<u8>>,
    /// Whether the response body exceeded the cap
    pub is_response_body_truncated: Option<bool>,
    /// Original (pre-truncation) response body length
    pub response_content_length: Option<u64>,

    /// Failure description when no response was produced
    pub error: Option<String>,
}

/// Generate a new call identifier.
///
/// Layout: `{epoch_millis}-{random}-{uuid}-{hash}`.
pub fn new_call_id() -> String {
    let timestamp = Utc::now().timestamp_millis();
    let random = uuid::Uuid::new_v4().as_u64_pair().0 as i64;
    let uuid = uuid::Uuid::new_v4();
    let raw = format!("{}-{}-{}", timestamp, random, uuid);
    let mut hasher = DefaultHasher::new();
    raw.hash(&mut hasher);
    format!("{}-{:x}", raw, hasher.finish())
}

impl CallRecord {
    /// Create a pending record for an outgoing request
    pub fn new(method: &str, url: &str, request_headers: Headers) -> Self {
        Self {
            id: new_call_id(),
            request_timestamp: Utc::now().timestamp_millis(),
            method: method.to_string(),
            url: url.to_string(),
            protocol: None,
            request_content_type: request_headers.first_ignore_case("content-type"),
            request_headers,
            request_body: None,
            is_request_body_truncated: false,
            request_content_length: 0,
            response_timestamp: None,
            response_code: None,
            response_content_type: None,
            response_headers: None,
            response_body: None,
            is_response_body_truncated: None,
            response_content_length: None,
            error: None,
        }
    }

    #[inline]
    pub fn state(&self) -> CallState {
        if self.is_in_progress() {
            CallState::Pending
        } else {
            CallState::Completed
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.response_code.is_none() && self.error.is_none()
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_in_progress()
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.response_code, Some(300..=399))
    }

    /// A transport failure was recorded
    pub fn is_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.trim().is_empty())
    }

    /// The server answered with something other than 1xx, 2xx or 3xx
    pub fn is_http_error(&self) -> bool {
        match self.response_code {
            None => false,
            Some(code) => !(100..400).contains(&code),
        }
    }

    /// Row-level failure flag: transport failure or HTTP error status
    pub fn is_failed(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty()) || self.is_http_error()
    }

    pub fn protocol_or_default(&self) -> &str {
        self.protocol.as_deref().unwrap_or(DEFAULT_PROTOCOL)
    }

    /// Host name parsed from the URL, empty when the URL has none
    pub fn host(&self) -> String {
        reqwest::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default()
    }

    /// Encoded path plus query string
    pub fn path_and_query(&self) -> String {
        match reqwest::Url::parse(&self.url) {
            Ok(url) => match url.query() {
                Some(q) => format!("{}?{}", url.path(), q),
                None => url.path().to_string(),
            },
            Err(_) => String::new(),
        }
    }

    pub fn is_secure(&self) -> bool {
        reqwest::Url::parse(&self.url)
            .map(|u| matches!(u.scheme(), "https" | "wss"))
            .unwrap_or(false)
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.response_timestamp
            .map(|end| (end - self.request_timestamp).max(0))
    }

    /// Duration as `h:m:s ms ms`, collapsing leading zero units
    pub fn duration_str(&self) -> Option<String> {
        let total = self.duration_ms()?;
        let hours = total / 3_600_000;
        let minutes = (total / 60_000) % 60;
        let seconds = (total / 1000) % 60;
        let millis = total % 1000;
        if hours > 0 {
            Some(format!("{}:{}:{} {} ms", hours, minutes, seconds, millis))
        } else if minutes > 0 {
            Some(format!("{}:{} {} ms", minutes, seconds, millis))
        } else if seconds > 0 {
            Some(format!("{} {} ms", seconds, millis))
        } else if millis > 0 {
            Some(format!("{} ms", millis))
        } else {
            None
        }
    }

    pub fn request_size_str(&self) -> String {
        size_str(self.request_content_length)
    }

    pub fn response_size_str(&self) -> Option<String> {
        self.response_content_length.map(size_str)
    }

    /// Request plus response size, once the response length is known
    pub fn total_size_str(&self) -> Option<String> {
        self.response_content_length
            .map(|response| size_str(self.request_content_length + response))
    }

    /// Viewer format for the request body; truncated bodies have none
    pub fn request_content_format(&self) -> Option<ContentFormat> {
        content_format(
            self.request_content_type.as_deref(),
            self.is_request_body_truncated,
        )
    }

    pub fn response_content_format(&self) -> Option<ContentFormat> {
        content_format(
            self.response_content_type.as_deref(),
            self.is_response_body_truncated.unwrap_or(false),
        )
    }

    /// Request body decoded as UTF-8, invalid sequences replaced
    pub fn request_body_text(&self) -> Option<String> {
        body_text(self.request_body.as_deref())
    }

    pub fn response_body_text(&self) -> Option<String> {
        body_text(self.response_body.as_deref())
    }

    /// Request body as space-separated byte values
    pub fn request_body_bytes_str(&self) -> Option<String> {
        body_bytes_str(self.request_body.as_deref())
    }

    pub fn response_body_bytes_str(&self) -> Option<String> {
        body_bytes_str(self.response_body.as_deref())
    }

    /// Pretty-printed request body when it is complete, valid JSON
    pub fn request_body_json(&self) -> Option<String> {
        body_json(self.request_body.as_deref(), self.is_request_body_truncated)
    }

    pub fn response_body_json(&self) -> Option<String> {
        body_json(
            self.response_body.as_deref(),
            self.is_response_body_truncated.unwrap_or(false),
        )
    }

    pub fn request_time_str(&self) -> String {
        format_local(self.request_timestamp, "%H:%M:%S")
    }

    pub fn request_datetime_str(&self) -> String {
        format_local(self.request_timestamp, "%Y-%m-%d %H:%M:%S")
    }

    pub fn response_datetime_str(&self) -> Option<String> {
        self.response_timestamp
            .map(|ts| format_local(ts, "%Y-%m-%d %H:%M:%S"))
    }
}

/// Byte count as `B`, `KB` or `MB`
pub fn size_str(size: u64) -> String {
    if size < 1024 {
        format!("{}B", size)
    } else if size < 1024 * 1024 {
        format!("{:.1}KB", size as f64 / 1024.0)
    } else {
        format!("{:.1}MB", size as f64 / (1024.0 * 1024.0))
    }
}

fn content_format(content_type: Option<&str>, truncated: bool) -> Option<ContentFormat> {
    if truncated {
        return None;
    }
    ContentType::classify(content_type?).format
}

fn body_text(body: Option<&[u8]>) -> Option<String> {
    body.map(|bytes| String::from_utf8_lossy(bytes).into_owned())
}

fn body_bytes_str(body: Option<&[u8]>) -> Option<String> {
    body.map(|bytes| {
        bytes
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    })
}

fn body_json(body: Option<&[u8]>, truncated: bool) -> Option<String> {
    if truncated {
        return None;
    }
    let value: serde_json::Value = serde_json::from_slice(body?).ok()?;
    serde_json::to_string_pretty(&value).ok()
}

fn format_local(epoch_ms: i64, pattern: &str) -> String {
    Local
        .timestamp_millis_opt(epoch_ms)
        .single()
        .map(|dt| dt.format(pattern).to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Filter options for listing calls
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFilter {
    /// Case-insensitive URL substring; blank matches everything
    pub search_query: String,
    /// Keep only failed calls
    pub only_errors: bool,
}

impl CallFilter {
    pub fn matches(&self, call: &CallRecord) -> bool {
        if self.only_errors && !call.is_failed() {
            return false;
        }
        let query = self.search_query.trim();
        if query.is_empty() {
            return true;
        }
        call.url
            .to_ascii_lowercase()
            .contains(&query.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(code: Option<u16>, error: Option<&str>) -> CallRecord {
        let mut call = CallRecord::new("GET", "https://api.example.com/v1/items?page=2", Headers::new());
        call.response_code = code;
        call.error = error.map(str::to_string);
        call
    }

    #[test]
    fn call_ids_are_unique_and_structured() {
        let a = new_call_id();
        let b = new_call_id();
        assert_ne!(a, b);
        // timestamp, random, five uuid groups, hash
        assert!(a.split('-').count() >= 8, "unexpected id layout: {a}");
        assert!(a.split('-').next().unwrap().parse::<i64>().is_ok());
    }

    #[test]
    fn state_follows_response_and_error() {
        assert_eq!(completed(None, None).state(), CallState::Pending);
        assert_eq!(completed(Some(200), None).state(), CallState::Completed);
        assert_eq!(completed(None, Some("boom")).state(), CallState::Completed);
    }

    #[test]
    fn status_classification() {
        assert!(completed(Some(302), None).is_redirect());
        assert!(!completed(Some(302), None).is_http_error());
        assert!(completed(Some(404), None).is_http_error());
        assert!(completed(Some(404), None).is_failed());
        assert!(!completed(Some(204), None).is_failed());
        assert!(completed(None, Some("timeout")).is_failed());
        assert!(completed(None, Some("timeout")).is_error());
    }

    #[test]
    fn url_parts_are_derived() {
        let call = completed(None, None);
        assert_eq!(call.host(), "api.example.com");
        assert_eq!(call.path_and_query(), "/v1/items?page=2");
        assert!(call.is_secure());

        let plain = CallRecord::new("GET", "http://localhost:8080/", Headers::new());
        assert!(!plain.is_secure());
        assert_eq!(plain.path_and_query(), "/");
    }

    #[test]
    fn duration_collapses_leading_units() {
        let mut call = completed(Some(200), None);
        call.response_timestamp = None;
        assert_eq!(call.duration_str(), None);

        call.response_timestamp = Some(call.request_timestamp + 250);
        assert_eq!(call.duration_str().as_deref(), Some("250 ms"));

        call.response_timestamp = Some(call.request_timestamp + 2_005);
        assert_eq!(call.duration_str().as_deref(), Some("2 5 ms"));

        call.response_timestamp = Some(call.request_timestamp + 61_000);
        assert_eq!(call.duration_str().as_deref(), Some("1:1 0 ms"));

        call.response_timestamp = Some(call.request_timestamp);
        assert_eq!(call.duration_str(), None);
    }

    #[test]
    fn sizes_are_formatted() {
        assert_eq!(size_str(512), "512B");
        assert_eq!(size_str(2048), "2.0KB");
        assert_eq!(size_str(3 * 1024 * 1024), "3.0MB");

        let mut call = completed(Some(200), None);
        call.request_content_length = 100;
        assert_eq!(call.total_size_str(), None);
        call.response_content_length = Some(200);
        assert_eq!(call.total_size_str().as_deref(), Some("300B"));
    }

    #[test]
    fn truncated_bodies_have_no_format() {
        let mut call = completed(Some(200), None);
        call.response_content_type = Some("application/json; charset=utf-8".into());
        call.is_response_body_truncated = Some(false);
        assert_eq!(call.response_content_format(), Some(ContentFormat::Json));

        call.is_response_body_truncated = Some(true);
        assert_eq!(call.response_content_format(), None);
        assert_eq!(call.request_content_format(), None);
    }

    #[test]
    fn filter_matches_query_and_errors() {
        let ok = completed(Some(200), None);
        let failed = completed(Some(500), None);

        let by_query = CallFilter {
            search_query: "  ITEMS ".into(),
            only_errors: false,
        };
        assert!(by_query.matches(&ok));

        let missing = CallFilter {
            search_query: "orders".into(),
            only_errors: false,
        };
        assert!(!missing.matches(&ok));

        let only_errors = CallFilter {
            search_query: String::new(),
            only_errors: true,
        };
        assert!(!only_errors.matches(&ok));
        assert!(only_errors.matches(&failed));
    }

    #[test]
    fn body_views_of_json_payload() {
        let mut call = completed(Some(200), None);
        call.request_body = Some(b"{\"a\":1}".to_vec());
        call.response_body = Some(vec![b'h', b'i', 0xff]);

        assert_eq!(call.request_body_text().as_deref(), Some("{\"a\":1}"));
        assert_eq!(call.request_body_json().as_deref(), Some("{\n  \"a\": 1\n}"));
        assert_eq!(call.response_body_text().as_deref(), Some("hi\u{fffd}"));
        assert_eq!(call.response_body_bytes_str().as_deref(), Some("104 105 255"));
        assert_eq!(call.response_body_json(), None);
    }

    #[test]
    fn json_view_needs_a_complete_well_formed_body() {
        let mut call = completed(Some(200), None);
        call.response_body = Some(b"{\"items\": [1, 2".to_vec());
        assert_eq!(call.response_body_json(), None);

        call.response_body = Some(b"[1,2]".to_vec());
        call.is_response_body_truncated = Some(true);
        assert_eq!(call.response_body_json(), None);
        assert_eq!(call.response_body_text().as_deref(), Some("[1,2]"));

        call.is_response_body_truncated = Some(false);
        assert!(call.response_body_json().is_some());

        call.response_body = None;
        assert_eq!(call.response_body_json(), None);
        assert_eq!(call.response_body_bytes_str(), None);
    }
}
