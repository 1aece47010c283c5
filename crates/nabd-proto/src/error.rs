use thiserror::Error;

/// Top-level error type for the `nabd-proto` crate.
///
/// Covers request framing, block encoding and the choreography codec.
#[derive(Debug, Error)]
pub enum Error {
    // ── Request framing ─────────────────────────────────────────────
    /// The request line, a header or the body did not parse.
    #[error("Malformed request: {reason}")]
    MalformedRequest { reason: String },

    /// The connection closed before the header block was complete.
    #[error("Connection closed before the request was complete")]
    UnexpectedEof,

    /// The header block or the body exceeded the configured limit.
    #[error("Request too large: {size} bytes (limit {limit})")]
    RequestTooLarge { size: usize, limit: usize },

    // ── Packet codec ────────────────────────────────────────────────
    /// A block's data does not fit in the 24-bit length field.
    #[error("Block {kind:#04x} too large: {size} bytes (limit {limit})")]
    BlockTooLarge { kind: u8, size: usize, limit: usize },

    // ── Choreography codec ──────────────────────────────────────────
    /// The length prefix has a non-zero high byte.
    #[error("Corrupt choreography: length prefix high byte is {0:#04x}")]
    ChoreographyCorrupt(u8),

    /// The declared payload length does not match the bytes present.
    #[error("Choreography length mismatch: declared {declared}, found {actual}")]
    ChoreographyLength { declared: usize, actual: usize },

    /// The 4-byte zero terminator is missing or non-zero.
    #[error("Choreography terminator missing")]
    ChoreographyTerminator,

    /// The payload does not fit in the 24-bit length field.
    #[error("Choreography payload too large: {0} bytes")]
    ChoreographyTooLarge(usize),

    // ── Transport ───────────────────────────────────────────────────
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRequest {
            reason: reason.into(),
        }
    }

    /// Returns `true` if the peer sent something we could not parse,
    /// as opposed to the socket failing underneath us or an outgoing
    /// packet that cannot be encoded.
    pub fn is_malformed(&self) -> bool {
        !matches!(
            self,
            Self::Io(_) | Self::BlockTooLarge { .. } | Self::ChoreographyTooLarge(_)
        )
    }
}
