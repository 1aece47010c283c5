// ── Responses ──
//
// Every exchange ends with exactly one `HTTP/1.0` response. Bodies are
// written in small, spaced-out chunks because the device's network stack
// drops data when fed too fast.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    NotFound,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::NotFound => 404,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NotFound => "Not Found",
        }
    }
}

/// Chunking policy for response bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    pub chunk_size: usize,
    pub delay: Duration,
}

impl Throttle {
    pub const DEFAULT_CHUNK_SIZE: usize = 1000;
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(25);

    /// Write everything in one go.
    pub fn none() -> Self {
        Self {
            chunk_size: usize::MAX,
            delay: Duration::ZERO,
        }
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self {
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            delay: Self::DEFAULT_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: Status,
    body: Bytes,
}

impl Response {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: Status::Ok,
            body: body.into(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            body: Bytes::new(),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Status line and headers, blank line included.
    pub fn head(&self) -> String {
        format!(
            "HTTP/1.0 {} {}\r\nContent-length: {}\r\n\r\n",
            self.status.code(),
            self.status.reason(),
            self.body.len()
        )
    }

    pub async fn write_to<W>(&self, writer: &mut W, throttle: &Throttle) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(self.head().as_bytes()).await?;
        writer.flush().await?;
        write_throttled(writer, &self.body, throttle).await
    }
}

/// Write `data` in `chunk_size` pieces, sleeping `delay` between pieces.
pub async fn write_throttled<W>(writer: &mut W, data: &[u8], throttle: &Throttle) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    for (i, chunk) in data.chunks(throttle.chunk_size.max(1)).enumerate() {
        if i > 0 && !throttle.delay.is_zero() {
            tokio::time::sleep(throttle.delay).await;
        }
        writer.write_all(chunk).await?;
        writer.flush().await?;
    }
    Ok(())
}
