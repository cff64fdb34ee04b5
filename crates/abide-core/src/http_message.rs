//! Wire dumps of HTTP messages and their normalisation before comparison.

use std::{collections::BTreeMap, fmt::Write as _};

use http::{HeaderMap, Request, Response, header};
use serde_json::Value;

use crate::{config::AbideConfig, substitute};

/// An HTTP dump split into header lines and body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpMessage {
    header: Vec<String>,
    body: String,
}

impl HttpMessage {
    /// Splits a dump at its first blank line. Line endings may be CRLF.
    #[must_use]
    pub fn parse(dump: &str) -> Self {
        let lines: Vec<&str> = dump
            .trim()
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .collect();

        let header: Vec<String> = lines
            .iter()
            .take_while(|line| !line.trim().is_empty())
            .map(|line| (*line).to_string())
            .collect();
        let body = lines[header.len()..].join("\n").trim().to_string();

        Self { header, body }
    }

    #[must_use]
    pub fn header_lines(&self) -> &[String] {
        &self.header
    }

    #[must_use]
    pub fn header_dump(&self) -> String {
        self.header.join("\n")
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    #[must_use]
    pub fn dump(&self) -> String {
        format!("{}\n\n{}", self.header_dump(), self.body)
    }

    /// Rewrites the value of every header line whose name has a configured
    /// default.
    pub fn apply_header_defaults(&mut self, config: &AbideConfig) {
        for line in &mut self.header {
            let Some((name, _)) = line.split_once(':') else {
                continue;
            };
            if let Some(default) = config.header_default(name.trim()) {
                *line = format!("{name}: {}", render_header_value(default));
            }
        }
    }

    /// Parses the body as JSON, applies the configured defaults to it and
    /// re-serialises it with two-space indentation. Empty bodies are kept.
    pub fn normalize_json_body(
        &mut self,
        defaults: &BTreeMap<String, Value>,
    ) -> serde_json::Result<()> {
        if self.body.trim().is_empty() {
            return Ok(());
        }

        let mut document: Value = serde_json::from_str(&self.body)?;
        substitute::apply_defaults(&mut document, defaults);
        self.body = serde_json::to_string_pretty(&document)?;
        Ok(())
    }
}

fn render_header_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// True for `application/json` and vendor types shaped `application/vnd.*+json`.
#[must_use]
pub fn is_json_content_type(content_type: &str) -> bool {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    media_type == "application/json"
        || (media_type.starts_with("application/vnd.") && media_type.ends_with("+json"))
}

pub(crate) fn has_json_body(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(is_json_content_type)
}

/// Dumps a request the way a client sends it: origin-form target and a
/// `Host` header taken from the URI authority.
#[must_use]
pub fn dump_request_out<B: AsRef<[u8]>>(request: &Request<B>) -> String {
    let target = request
        .uri()
        .path_and_query()
        .map_or("/", |path| path.as_str());
    let mut out = format!("{} {target} {:?}\r\n", request.method(), request.version());

    let host = request
        .uri()
        .authority()
        .map(|authority| authority.as_str().to_string())
        .or_else(|| {
            request
                .headers()
                .get(header::HOST)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        });
    if let Some(host) = host {
        let _ = write!(out, "Host: {host}\r\n");
    }

    write_headers(&mut out, request.headers(), true);
    finish_dump(out, request.body().as_ref())
}

/// Dumps a request the way a server received it; the target is written
/// exactly as held in the URI.
#[must_use]
pub fn dump_request<B: AsRef<[u8]>>(request: &Request<B>) -> String {
    let mut out = format!(
        "{} {} {:?}\r\n",
        request.method(),
        request.uri(),
        request.version()
    );
    write_headers(&mut out, request.headers(), false);
    finish_dump(out, request.body().as_ref())
}

#[must_use]
pub fn dump_response<B: AsRef<[u8]>>(response: &Response<B>) -> String {
    let status = response.status();
    let mut out = format!("{:?} {}", response.version(), status.as_str());
    if let Some(reason) = status.canonical_reason() {
        let _ = write!(out, " {reason}");
    }
    out.push_str("\r\n");
    write_headers(&mut out, response.headers(), false);
    finish_dump(out, response.body().as_ref())
}

fn write_headers(out: &mut String, headers: &HeaderMap, skip_host: bool) {
    let mut lines: Vec<(String, String)> = headers
        .iter()
        .filter(|(name, _)| !(skip_host && **name == header::HOST))
        .map(|(name, value)| {
            (
                canonical_header_name(name.as_str()),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    lines.sort();

    for (name, value) in lines {
        let _ = write!(out, "{name}: {value}\r\n");
    }
}

fn finish_dump(mut out: String, body: &[u8]) -> String {
    out.push_str("\r\n");
    out.push_str(&String::from_utf8_lossy(body));
    out
}

/// `content-type` becomes `Content-Type`.
#[must_use]
pub fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
