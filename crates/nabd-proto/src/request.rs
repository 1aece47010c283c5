// ── Request framing ──
//
// Devices speak a minimal HTTP/1.0 dialect: one request line, headers until
// a blank line, then an optional body of exactly `Content-length` bytes.
// One request per connection.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::Error;

/// Size limits applied while reading a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Request line plus headers.
    pub max_head_bytes: usize,
    pub max_body_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_head_bytes: 8 * 1024,
            max_body_bytes: 4 * 1024 * 1024,
        }
    }
}

/// A parsed device request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: String,
    target: String,
    protocol: String,
    path: String,
    params: HashMap<String, String>,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl Request {
    /// Read one request from `reader`.
    pub async fn read_from<R>(reader: &mut R, limits: &Limits) -> Result<Self, Error>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut head_len = 0usize;
        let mut line = Vec::new();

        let request_line = read_line(reader, &mut line, &mut head_len, limits).await?;
        let (method, target, protocol) = parse_request_line(&request_line)?;

        let mut headers = Vec::new();
        loop {
            let header = read_line(reader, &mut line, &mut head_len, limits).await?;
            if header.is_empty() {
                break;
            }
            headers.push(parse_header(&header)?);
        }

        let content_length = content_length(&headers)?;
        if content_length > limits.max_body_bytes {
            return Err(Error::RequestTooLarge {
                size: content_length,
                limit: limits.max_body_bytes,
            });
        }
        let mut body = vec![0u8; content_length];
        if content_length > 0 {
            reader.read_exact(&mut body).await.map_err(eof_aware)?;
        }

        let (path, params) = split_target(&target);
        tracing::trace!(%method, %path, body_len = body.len(), "request parsed");

        Ok(Self {
            method,
            target,
            protocol,
            path,
            params,
            headers,
            body: Bytes::from(body),
        })
    }

    /// Build a body-less request directly; mostly useful in tests.
    pub fn get(target: &str) -> Self {
        let (path, params) = split_target(target);
        Self {
            method: "GET".into(),
            target: target.into(),
            protocol: "HTTP/1.0".into(),
            path,
            params,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.method = "POST".into();
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Raw request target, query string included.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Target without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Case-insensitive header lookup; first match wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

// ── Private helpers ─────────────────────────────────────────────────

async fn read_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    head_len: &mut usize,
    limits: &Limits,
) -> Result<String, Error>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    // At most one byte past the remaining budget.
    let budget = limits.max_head_bytes.saturating_sub(*head_len) + 1;
    let read = (&mut *reader)
        .take(u64::try_from(budget).unwrap_or(u64::MAX))
        .read_until(b'\n', buf)
        .await?;
    *head_len += read;
    if *head_len > limits.max_head_bytes {
        return Err(Error::RequestTooLarge {
            size: *head_len,
            limit: limits.max_head_bytes,
        });
    }
    if read == 0 || buf.last() != Some(&b'\n') {
        return Err(Error::UnexpectedEof);
    }
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    String::from_utf8(std::mem::take(buf)).map_err(|_| Error::malformed("non UTF-8 header line"))
}

fn parse_request_line(line: &str) -> Result<(String, String, String), Error> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(protocol), None) => {
            Ok((method.to_owned(), target.to_owned(), protocol.to_owned()))
        }
        _ => Err(Error::malformed(format!("bad request line {line:?}"))),
    }
}

fn parse_header(line: &str) -> Result<(String, String), Error> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| Error::malformed(format!("bad header {line:?}")))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::malformed("empty header name"));
    }
    Ok((name.to_owned(), value.trim().to_owned()))
}

fn content_length(headers: &[(String, String)]) -> Result<usize, Error> {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .map_or(Ok(0), |(_, value)| {
            value
                .parse::<usize>()
                .map_err(|_| Error::malformed(format!("bad Content-length {value:?}")))
        })
}

/// Split `path?a=1&b` into the path and its parameters. A key without `=`
/// maps to an empty value; a repeated key keeps the last value.
fn split_target(target: &str) -> (String, HashMap<String, String>) {
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let params = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key.to_owned(), value.to_owned())
        })
        .collect();
    (path.to_owned(), params)
}

fn eof_aware(err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::UnexpectedEof
    } else {
        Error::Io(err)
    }
}
