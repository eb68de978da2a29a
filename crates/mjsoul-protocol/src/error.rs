//! Error types for the protocol layer.
//!
//! Each crate in mjsoul defines its own error enum. A `ProtocolError`
//! always means the bytes themselves were wrong: a frame header, an
//! envelope, or a protobuf field that could not be parsed.

/// Errors that can occur while decoding frames and wire data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The bytes do not form a valid frame, envelope, or message body.
    ///
    /// Common causes: truncated input, a length prefix running past the
    /// end of the buffer, an over-long varint, or an invalid wire type.
    #[error("frame corrupt: {0}")]
    FrameCorrupt(String),

    /// The first byte of a frame is not one of the known message types.
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),
}

impl ProtocolError {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        Self::FrameCorrupt(reason.into())
    }
}
