//! Capture helpers applied to every request and response before storage

pub mod codec;
pub mod sanitizer;

pub use codec::{cap_body, BodyCapture, CappedBody};
pub use sanitizer::{sanitize_headers, SanitizedHeader, DEFAULT_PLACEHOLDER};
