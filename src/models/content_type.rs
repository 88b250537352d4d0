//! Content type classification for list and detail views

use serde::{Deserialize, Serialize};

/// How a body can be pretty-printed by a viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentFormat {
    Css,
    FormUrlEncoded,
    Json,
    Xml,
}

/// Known content type: MIME prefix, short label and display format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentType {
    pub mime: &'static str,
    pub label: &'static str,
    pub format: Option<ContentFormat>,
}

impl ContentType {
    pub const UNKNOWN: ContentType = ContentType {
        mime: "",
        label: "?",
        format: None,
    };

    /// Classify a raw `Content-Type` header value (parameters are allowed)
    pub fn classify(raw: &str) -> ContentType {
        let lowered = raw.to_ascii_lowercase();
        KNOWN
            .iter()
            .find(|ct| lowered.contains(ct.mime))
            .copied()
            .unwrap_or(Self::UNKNOWN)
    }

    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }
}

const fn ct(mime: &'static str, label: &'static str, format: Option<ContentFormat>) -> ContentType {
    ContentType {
        mime,
        label,
        format,
    }
}

use ContentFormat::{Css, FormUrlEncoded, Json, Xml};

// Order matters: the first contained MIME wins.
const KNOWN: &[ContentType] = &[
    ct("application/json", "JSON", Some(Json)),
    ct("application/hal+json", "HAL", Some(Json)),
    ct("application/problem+json", "PROB", Some(Json)),
    ct("application/vnd.api+json", "API", Some(Json)),
    ct("application/problem+xml", "PROB", Some(Xml)),
    ct("application/atom+xml", "ATOM", Some(Xml)),
    ct("application/rss+xml", "RSS", Some(Xml)),
    ct("application/soap+xml", "SOAP", Some(Xml)),
    ct("application/xaml+xml", "XAML", Some(Xml)),
    ct("application/xml-dtd", "DTD", Some(Xml)),
    ct("application/xml", "XML", Some(Xml)),
    ct("application/x-www-form-urlencoded", "FORM", Some(FormUrlEncoded)),
    ct("application/javascript", "JS", None),
    ct("application/octet-stream", "BIN", None),
    ct("application/cbor", "CBOR", None),
    ct("application/protobuf", "PROTO", None),
    ct("application/pdf", "PDF", None),
    ct("application/zip", "ZIP", None),
    ct("application/gzip", "GZ", None),
    ct("application/wasm", "WASM", None),
    ct("image/svg+xml", "SVG", Some(Xml)),
    ct("image/gif", "GIF", None),
    ct("image/jpeg", "JPEG", None),
    ct("image/png", "PNG", None),
    ct("image/webp", "WEBP", None),
    ct("image/x-icon", "ICO", None),
    ct("image/bmp", "BMP", None),
    ct("text/css", "CSS", Some(Css)),
    ct("text/csv", "CSV", None),
    ct("text/html", "HTML", Some(Xml)),
    ct("text/javascript", "JS", None),
    ct("text/xml", "XML", Some(Xml)),
    ct("text/event-stream", "SSE", None),
    ct("text/plain", "TXT", None),
    ct("audio/", "AUDIO", None),
    ct("video/", "VIDEO", None),
    ct("font/", "FONT", None),
    ct("multipart/form-data", "FORM", None),
    ct("multipart/", "PART", None),
    ct("image/", "IMG", None),
    ct("text/", "TXT", None),
    ct("application/", "APP", None),
];
