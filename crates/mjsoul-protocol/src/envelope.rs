//! The `(name, data)` envelope every frame carries.
//!
//! On the wire this is the protobuf message
//!
//! ```text
//! message Wrapper {
//!     string name = 1;
//!     bytes  data = 2;
//! }
//! ```
//!
//! `name` addresses the payload to a schema (`.lq.Lobby.oauth2Login`
//! for a request, `.lq.NotifyRoomGameStart` for a notification, empty
//! for most responses); `data` is the serialized message itself.

use crate::wire::{self, Reader, WireType};
use crate::ProtocolError;

const NAME_FIELD: u32 = 1;
const DATA_FIELD: u32 = 2;

/// A qualified name plus opaque payload bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub name: String,
    pub data: Vec<u8>,
}

impl Envelope {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Serializes the envelope into wrapper bytes.
    ///
    /// Empty fields are omitted, as any proto3 encoder would.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.name.len() + self.data.len() + 6);
        self.encode_into(&mut buf);
        buf
    }

    /// Appends the wrapper bytes to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        if !self.name.is_empty() {
            wire::put_length_delimited(buf, NAME_FIELD, self.name.as_bytes());
        }
        if !self.data.is_empty() {
            wire::put_length_delimited(buf, DATA_FIELD, &self.data);
        }
    }

    /// Parses wrapper bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::FrameCorrupt`] if the container is
    /// truncated, uses the wrong wire type for a known field, or carries
    /// a name that is not UTF-8. Unknown fields are skipped.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = Reader::new(bytes);
        let mut envelope = Self::default();

        while !reader.is_empty() {
            let (field, wire_type) = reader.read_key()?;
            match (field, wire_type) {
                (NAME_FIELD, WireType::LengthDelimited) => {
                    let raw = reader.read_length_delimited()?;
                    envelope.name = std::str::from_utf8(raw)
                        .map_err(|_| {
                            ProtocolError::corrupt("envelope name is not UTF-8")
                        })?
                        .to_string();
                }
                (DATA_FIELD, WireType::LengthDelimited) => {
                    envelope.data = reader.read_length_delimited()?.to_vec();
                }
                (NAME_FIELD | DATA_FIELD, other) => {
                    return Err(ProtocolError::corrupt(format!(
                        "envelope field {field} has wire type {other:?}"
                    )));
                }
                _ => reader.skip(field, wire_type)?,
            }
        }

        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_exact_bytes() {
        let envelope = Envelope::new(".lq.Lobby.heatbeat", vec![0x08, 0x01]);
        let bytes = envelope.encode();

        let mut expected = vec![0x0a, 18];
        expected.extend_from_slice(b".lq.Lobby.heatbeat");
        expected.extend_from_slice(&[0x12, 2, 0x08, 0x01]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_envelope_round_trip() {
        let envelope = Envelope::new(".lq.Lobby.fetchGameRecord", vec![0, 1, 2, 255]);
        assert_eq!(Envelope::decode(&envelope.encode()).unwrap(), envelope);
    }

    #[test]
    fn test_empty_envelope_encodes_to_nothing() {
        let envelope = Envelope::default();
        assert!(envelope.encode().is_empty());
        assert_eq!(Envelope::decode(&[]).unwrap(), envelope);
    }

    #[test]
    fn test_response_envelope_without_name() {
        let envelope = Envelope::new("", vec![0x08, 0x2a]);
        let decoded = Envelope::decode(&envelope.encode()).unwrap();
        assert!(decoded.name.is_empty());
        assert_eq!(decoded.data, vec![0x08, 0x2a]);
    }

    #[test]
    fn test_unknown_field_is_skipped() {
        let mut bytes = Envelope::new("n", vec![1]).encode();
        // field 3, varint 7
        bytes.extend_from_slice(&[0x18, 0x07]);
        let decoded = Envelope::decode(&bytes).unwrap();
        assert_eq!(decoded, Envelope::new("n", vec![1]));
    }

    #[test]
    fn test_truncated_envelope_is_corrupt() {
        let bytes = Envelope::new("abcdef", vec![]).encode();
        let err = Envelope::decode(&bytes[..4]).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameCorrupt(_)));
    }

    #[test]
    fn test_wrong_wire_type_for_name_is_corrupt() {
        // field 1 as varint
        assert!(Envelope::decode(&[0x08, 0x01]).is_err());
    }

    #[test]
    fn test_non_utf8_name_is_corrupt() {
        assert!(Envelope::decode(&[0x0a, 0x02, 0xff, 0xfe]).is_err());
    }
}
