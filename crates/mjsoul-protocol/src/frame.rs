//! Frame header: message type plus optional sequence index.
//!
//! ```text
//! REQUEST / RESPONSE
//!
//!   byte   0        1        2        3 ...
//!        ┌────────┬─────────────────┬──────────────────────┐
//!        │  type  │ index (u16, LE) │  envelope bytes ...  │
//!        └────────┴─────────────────┴──────────────────────┘
//!
//! NOTIFY
//!
//!   byte   0        1 ...
//!        ┌────────┬──────────────────────┐
//!        │  type  │  envelope bytes ...  │
//!        └────────┴──────────────────────┘
//! ```

use std::fmt;

use crate::{Envelope, ProtocolError};

/// The one-byte tag at the start of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Notify,
    Request,
    Response,
}

impl MessageType {
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Notify => 1,
            Self::Request => 2,
            Self::Response => 3,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            1 => Ok(Self::Notify),
            2 => Ok(Self::Request),
            3 => Ok(Self::Response),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notify => write!(f, "NOTIFY"),
            Self::Request => write!(f, "REQUEST"),
            Self::Response => write!(f, "RESPONSE"),
        }
    }
}

/// One wire unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Server-pushed event; carries no index.
    Notify(Envelope),
    /// Client → server call.
    Request { index: u16, envelope: Envelope },
    /// Server → client reply to the request with the same index.
    Response { index: u16, envelope: Envelope },
}

impl Frame {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Notify(_) => MessageType::Notify,
            Self::Request { .. } => MessageType::Request,
            Self::Response { .. } => MessageType::Response,
        }
    }

    /// The sequence index, for request and response frames.
    pub fn index(&self) -> Option<u16> {
        match self {
            Self::Notify(_) => None,
            Self::Request { index, .. } | Self::Response { index, .. } => {
                Some(*index)
            }
        }
    }

    pub fn envelope(&self) -> &Envelope {
        match self {
            Self::Notify(envelope)
            | Self::Request { envelope, .. }
            | Self::Response { envelope, .. } => envelope,
        }
    }

    pub fn into_envelope(self) -> Envelope {
        match self {
            Self::Notify(envelope)
            | Self::Request { envelope, .. }
            | Self::Response { envelope, .. } => envelope,
        }
    }

    /// Serializes the frame: header, then envelope.
    pub fn encode(&self) -> Vec<u8> {
        let envelope = self.envelope();
        let mut buf =
            Vec::with_capacity(3 + envelope.name.len() + envelope.data.len() + 6);
        buf.push(self.message_type().as_byte());
        if let Some(index) = self.index() {
            buf.extend_from_slice(&index.to_le_bytes());
        }
        envelope.encode_into(&mut buf);
        buf
    }

    /// Parses a whole frame.
    ///
    /// # Errors
    /// - [`ProtocolError::FrameCorrupt`] for an empty frame, a missing or
    ///   truncated index, or a malformed envelope.
    /// - [`ProtocolError::UnknownMessageType`] for an unrecognised type byte.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (kind, index, body) = Self::split_header(bytes)?;
        let envelope = Envelope::decode(body)?;
        Ok(match (kind, index) {
            (MessageType::Request, Some(index)) => Self::Request { index, envelope },
            (MessageType::Response, Some(index)) => Self::Response { index, envelope },
            _ => Self::Notify(envelope),
        })
    }

    /// Reads the type byte and, for requests and responses, the index,
    /// without looking at the envelope bytes that follow.
    ///
    /// Lets a receiver find the owner of a response whose envelope is
    /// damaged.
    pub fn split_header(
        bytes: &[u8],
    ) -> Result<(MessageType, Option<u16>, &[u8]), ProtocolError> {
        let (&type_byte, rest) = bytes
            .split_first()
            .ok_or_else(|| ProtocolError::corrupt("empty frame"))?;

        match MessageType::from_byte(type_byte)? {
            MessageType::Notify => Ok((MessageType::Notify, None, rest)),
            kind => match rest {
                [lo, hi, body @ ..] => {
                    Ok((kind, Some(u16::from_le_bytes([*lo, *hi])), body))
                }
                _ => Err(ProtocolError::corrupt(format!(
                    "{kind} frame too short for its index"
                ))),
            },
        }
    }
}
