//! Request preamble parsing.
//!
//! A preamble is the text block the router sends ahead of a request:
//!
//! ```text
//! GET /path HTTP/1.1
//! Host:example.com
//! Content-Length:12
//! _1
//! ```
//!
//! The trailing marker says whether the body follows on later binary frames (`_1`)
//! or there is none (`_2`). Everything here is untrusted input, so parsing never fails:
//! malformed lines are skipped and malformed values collapse to sentinels.

/// Marker line announcing that body chunks follow.
pub const BODY_PENDING_MARKER: &str = "_1";
/// Marker line announcing that the request has no body.
pub const NO_BODY_MARKER: &str = "_2";

/// Terminal marker of a preamble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMarker {
    Pending,
    NoBody,
}

/// A parsed request preamble.
#[derive(Debug, Clone)]
pub struct RequestPreamble {
    raw: String,
    method: String,
    path: String,
    http_version: String,
    headers: Vec<(String, String)>,
    marker: Option<BodyMarker>,
}

impl RequestPreamble {
    /// Parse a complete preamble. Lines are separated by `\n`; a trailing `\r` is ignored.
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let mut lines = raw.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line));

        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default().to_string();
        let path = parts.next().unwrap_or_default().to_string();
        let http_version = parts.next().unwrap_or_default().to_string();

        let mut headers = Vec::new();
        let mut marker = None;
        for line in lines {
            match line {
                BODY_PENDING_MARKER => {
                    marker = Some(BodyMarker::Pending);
                    break;
                }
                NO_BODY_MARKER => {
                    marker = Some(BodyMarker::NoBody);
                    break;
                }
                "" => continue,
                _ => {}
            }
            if let Some((name, value)) = line.split_once(':') {
                let name = name.trim();
                if !name.is_empty() {
                    headers.push((name.to_string(), value.to_string()));
                }
            }
        }

        Self {
            raw,
            method,
            path,
            http_version,
            headers,
            marker,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn http_version(&self) -> &str {
        &self.http_version
    }

    /// Headers in the order they appeared. Values are kept as sent.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Case-insensitive lookup. The first occurrence wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn marker(&self) -> Option<BodyMarker> {
        self.marker
    }

    /// Whether body chunks should be expected for this request.
    ///
    /// Without a marker line the declared content length decides.
    pub fn has_body(&self) -> bool {
        match self.marker {
            Some(BodyMarker::Pending) => true,
            Some(BodyMarker::NoBody) => false,
            None => self.body_length() > 0,
        }
    }

    /// The text exactly as received.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Declared `Content-Length`, or -1 when it is absent or not a plain signed integer.
    ///
    /// Zero and negative values are returned as written.
    pub fn body_length(&self) -> i64 {
        self.header("content-length")
            .map(parse_content_length)
            .unwrap_or(-1)
    }
}

fn parse_content_length(value: &str) -> i64 {
    let value = value.trim();
    let digits = value.strip_prefix('-').unwrap_or(value);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return -1;
    }
    value.parse::<i64>().unwrap_or(-1)
}
