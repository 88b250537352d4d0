//! Call interceptor
//!
//! Turns request/response/failure events into persisted call records. A call
//! moves from pending (request side only) to completed (response or error
//! recorded) exactly once; later events for the same id are ignored.
//!
//! Nothing here returns an error to the instrumented call: store failures are
//! logged and the event is dropped.

pub mod client;

pub use client::MonitoredClient;

use crate::capture::{cap_body, sanitize_headers, CappedBody};
use crate::config::MonitorConfig;
use crate::models::{CallRecord, Headers};
use crate::storage::CallStore;
use chrono::Utc;
use std::sync::Arc;

/// Error text recorded when the caller drops an in-flight call
pub const CANCELLED_ERROR: &str = "Call cancelled";

/// Request about to be dispatched, as seen by the inclusion filter
#[derive(Debug, Clone, Copy)]
pub struct OutgoingRequest<'a> {
    pub method: &'a str,
    pub url: &'a reqwest::Url,
    pub version: http::Version,
    pub headers: &'a http::HeaderMap,
    /// `None` when there is no body or it is streamed
    pub body: Option<&'a [u8]>,
}

/// Response as received from the transport, body fully read
#[derive(Debug, Clone, Copy)]
pub struct IncomingResponse<'a> {
    pub status: http::StatusCode,
    pub version: http::Version,
    pub headers: &'a http::HeaderMap,
    pub body: &'a [u8],
}

/// Status line and headers of a response whose body is still arriving
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: http::StatusCode,
    pub version: http::Version,
    pub headers: http::HeaderMap,
}

pub struct CallInterceptor {
    config: Arc<MonitorConfig>,
    store: Arc<dyn CallStore>,
}

impl CallInterceptor {
    pub fn new(config: Arc<MonitorConfig>, store: Arc<dyn CallStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CallStore> {
        &self.store
    }

    /// Record the request side of a new call.
    ///
    /// Returns the call id when the request is tracked and the pending record
    /// was stored; the later hooks take that id.
    pub async fn on_request(&self, request: &OutgoingRequest<'_>) -> Option<String> {
        if !self.config.is_tracked(request) {
            tracing::debug!("Skipping untracked {} {}", request.method, request.url);
            return None;
        }

        let headers = sanitize_headers(
            &Headers::from_header_map(request.headers),
            self.config.sanitized_headers(),
        );
        let mut call = CallRecord::new(request.method, request.url.as_str(), headers);
        call.protocol = Some(format!("{:?}", request.version));

        let body = cap_body(
            request.body.unwrap_or_default(),
            self.config.max_content_length(),
        );
        call.is_request_body_truncated = body.truncated;
        call.request_content_length = body.original_len;
        call.request_body = body.into_option();

        match self.store.insert(&call).await {
            Ok(()) => {
                tracing::debug!("Tracking call {} {} {}", call.id, call.method, call.url);
                Some(call.id)
            }
            Err(err) => {
                tracing::warn!("Failed to store call {} {}: {:#}", call.method, call.url, err);
                None
            }
        }
    }

    /// Complete a pending call with its response
    pub async fn on_response(&self, id: &str, response: &IncomingResponse<'_>) {
        let body = cap_body(response.body, self.config.max_content_length());
        self.record_response(id, response.status, response.version, response.headers, body)
            .await;
    }

    /// Complete a pending call with a response body captured while streaming
    pub async fn on_response_body(&self, id: &str, head: &ResponseHead, body: CappedBody) {
        self.record_response(id, head.status, head.version, &head.headers, body)
            .await;
    }

    async fn record_response(
        &self,
        id: &str,
        status: http::StatusCode,
        version: http::Version,
        headers: &http::HeaderMap,
        body: CappedBody,
    ) {
        let Some(mut call) = self.load_pending(id).await else {
            return;
        };

        let headers = sanitize_headers(
            &Headers::from_header_map(headers),
            self.config.sanitized_headers(),
        );

        call.protocol = Some(format!("{:?}", version));
        call.response_timestamp = Some(Utc::now().timestamp_millis());
        call.response_code = Some(status.as_u16());
        call.response_content_type = headers.first_ignore_case("content-type");
        call.response_headers = Some(headers);
        call.is_response_body_truncated = Some(body.truncated);
        call.response_content_length = Some(body.original_len);
        call.response_body = body.into_option();

        self.persist_update(&call).await;
    }

    /// Complete a pending call with a transport failure
    pub async fn on_failure(&self, id: &str, message: &str) {
        let Some(mut call) = self.load_pending(id).await else {
            return;
        };

        call.response_timestamp = Some(Utc::now().timestamp_millis());
        call.error = Some(message.to_string());

        self.persist_update(&call).await;
    }

    async fn load_pending(&self, id: &str) -> Option<CallRecord> {
        match self.store.get(id).await {
            Ok(Some(call)) if call.is_in_progress() => Some(call),
            Ok(Some(_)) => {
                tracing::debug!("Call {} already completed, ignoring event", id);
                None
            }
            Ok(None) => {
                tracing::debug!("Call {} not found, ignoring event", id);
                None
            }
            Err(err) => {
                tracing::warn!("Failed to load call {}: {:#}", id, err);
                None
            }
        }
    }

    async fn persist_update(&self, call: &CallRecord) {
        match self.store.update(call).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!("Call {} completed concurrently, ignoring event", call.id),
            Err(err) => tracing::warn!("Failed to update call {}: {:#}", call.id, err),
        }
    }
}
