//! Call exports: plain text transcript, curl, wget and bare URL

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::models::{CallRecord, Headers, DEFAULT_PROTOCOL};

/// File name used when an export is shared as a file
pub const SHARE_FILE_NAME: &str = "http_monitor.http";

const TRUNCATED_MARKER: &str = " (truncated)";
const COMMAND_SEPARATOR: &str = " \\\n  ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Text,
    Curl,
    Wget,
    Url,
}

pub fn export(call: &CallRecord, format: ExportFormat) -> String {
    match format {
        ExportFormat::Text => export_text(call),
        ExportFormat::Curl => export_curl(call),
        ExportFormat::Wget => export_wget(call),
        ExportFormat::Url => export_url(call),
    }
}

pub fn export_url(call: &CallRecord) -> String {
    call.url.clone()
}

/// Request and response as a readable transcript
pub fn export_text(call: &CallRecord) -> String {
    let protocol = call.protocol.as_deref().unwrap_or(DEFAULT_PROTOCOL);
    let mut out = String::new();

    let _ = writeln!(out, "{} {} {}", call.method, call.url, protocol);
    push_headers(&mut out, &call.request_headers);
    out.push('\n');
    push_body(
        &mut out,
        call.request_body.as_deref(),
        call.is_request_body_truncated,
    );
    out.push('\n');

    let code = call
        .response_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    let _ = writeln!(out, "{} {}", protocol, code);
    if let Some(headers) = &call.response_headers {
        push_headers(&mut out, headers);
    }
    out.push('\n');
    push_body(
        &mut out,
        call.response_body.as_deref(),
        call.is_response_body_truncated.unwrap_or(false),
    );
    out.push('\n');
    out
}

/// Request as a curl command line
pub fn export_curl(call: &CallRecord) -> String {
    let mut parts = vec![format!("curl -X \"{}\"", call.method)];
    for (name, values) in call.request_headers.iter() {
        parts.push(format!("-H \"{}\"", shell_escape(&header_line(name, values))));
    }
    if let Some(body) = request_body_text(call) {
        parts.push(format!("--data-binary \"{}\"", shell_escape(&body)));
    }
    parts.push(format!("\"{}\"", shell_escape(&call.url)));
    parts.join(COMMAND_SEPARATOR)
}

/// Request as a wget command line
pub fn export_wget(call: &CallRecord) -> String {
    let mut parts = vec![format!("wget --method=\"{}\"", call.method)];
    for (name, values) in call.request_headers.iter() {
        parts.push(format!(
            "--header=\"{}\"",
            shell_escape(&header_line(name, values))
        ));
    }
    if let Some(body) = request_body_text(call) {
        parts.push(format!("--body-data=\"{}\"", shell_escape(&body)));
    }
    parts.push(format!("\"{}\"", shell_escape(&call.url)));
    parts.join(COMMAND_SEPARATOR)
}

/// Write an export to `dir/http_monitor.http`, returning the file path
pub async fn export_to_dir(
    call: &CallRecord,
    format: ExportFormat,
    dir: impl AsRef<Path>,
) -> anyhow::Result<PathBuf> {
    let dir = dir.as_ref();
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating export directory {:?}", dir))?;
    let path = dir.join(SHARE_FILE_NAME);
    tokio::fs::write(&path, export(call, format))
        .await
        .context("writing export file")?;
    Ok(path)
}

/// Backslash-escape characters that are special inside double quotes
pub fn shell_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '$' => escaped.push_str("\\$"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn header_line(name: &str, values: &[String]) -> String {
    format!("{}: {}", name, values.join("; "))
}

fn push_headers(out: &mut String, headers: &Headers) {
    for (name, values) in headers.iter() {
        out.push_str(&header_line(name, values));
        out.push('\n');
    }
}

fn push_body(out: &mut String, body: Option<&[u8]>, truncated: bool) {
    let Some(body) = body else {
        return;
    };
    let mut text = String::from_utf8_lossy(body).into_owned();
    if truncated {
        text.push_str(TRUNCATED_MARKER);
    }
    if text.trim().is_empty() {
        return;
    }
    out.push_str(&text);
    out.push('\n');
}

fn request_body_text(call: &CallRecord) -> Option<String> {
    call.request_body
        .as_deref()
        .filter(|body| !body.is_empty())
        .map(|body| String::from_utf8_lossy(body).into_owned())
}
