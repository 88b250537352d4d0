//! Data models for the HTTP monitor
//!
//! These models are shared between the capture pipeline, the store and the
//! presentation collaborators.

pub mod call;
pub mod content_type;
pub mod headers;

pub use call::*;
pub use content_type::{ContentFormat, ContentType};
pub use headers::Headers;
