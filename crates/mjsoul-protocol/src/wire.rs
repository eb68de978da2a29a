//! Protocol-buffers wire primitives.
//!
//! Only the pieces the envelope and the dynamic message codec need:
//! varints, zig-zag, little-endian fixed-width values, field keys and
//! length-delimited payloads, plus skipping of fields we do not know.
//!
//! ## Invariants
//! - Every read is bounds checked and returns `FrameCorrupt` instead of
//!   panicking on truncated or hostile input.
//! - Writers never fail; they append to a caller-owned `Vec<u8>`.

use crate::ProtocolError;

/// Longest legal varint encoding of a `u64`.
const MAX_VARINT_LEN: usize = 10;

/// The protobuf wire type carried in the low three bits of a field key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    StartGroup,
    EndGroup,
    Fixed32,
}

impl WireType {
    fn from_bits(bits: u64) -> Result<Self, ProtocolError> {
        match bits {
            0 => Ok(Self::Varint),
            1 => Ok(Self::Fixed64),
            2 => Ok(Self::LengthDelimited),
            3 => Ok(Self::StartGroup),
            4 => Ok(Self::EndGroup),
            5 => Ok(Self::Fixed32),
            other => Err(ProtocolError::corrupt(format!(
                "invalid wire type {other}"
            ))),
        }
    }

    fn bits(self) -> u64 {
        match self {
            Self::Varint => 0,
            Self::Fixed64 => 1,
            Self::LengthDelimited => 2,
            Self::StartGroup => 3,
            Self::EndGroup => 4,
            Self::Fixed32 => 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Appends `value` as a base-128 varint.
pub fn put_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Appends a field key (field number + wire type).
pub fn put_key(buf: &mut Vec<u8>, field: u32, wire_type: WireType) {
    put_varint(buf, (u64::from(field) << 3) | wire_type.bits());
}

/// Appends a complete length-delimited field: key, length, bytes.
pub fn put_length_delimited(buf: &mut Vec<u8>, field: u32, data: &[u8]) {
    put_key(buf, field, WireType::LengthDelimited);
    put_varint(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

pub fn put_fixed32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub fn put_fixed64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub fn zigzag_encode32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

pub fn zigzag_decode32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

pub fn zigzag_encode64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

pub fn zigzag_decode64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// A bounds-checked cursor over an encoded protobuf message.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        if len > self.remaining() {
            return Err(ProtocolError::corrupt(format!(
                "need {len} bytes at offset {}, have {}",
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_varint(&mut self) -> Result<u64, ProtocolError> {
        let mut value = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.take(1)?[0];
            if i == MAX_VARINT_LEN - 1 && byte > 1 {
                break;
            }
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ProtocolError::corrupt("varint overflows 64 bits"))
    }

    /// Reads a field key, returning the field number and wire type.
    pub fn read_key(&mut self) -> Result<(u32, WireType), ProtocolError> {
        let key = self.read_varint()?;
        let wire_type = WireType::from_bits(key & 0x7)?;
        let field = key >> 3;
        if field == 0 || field > u64::from(u32::MAX >> 3) {
            return Err(ProtocolError::corrupt(format!(
                "invalid field number {field}"
            )));
        }
        Ok((field as u32, wire_type))
    }

    pub fn read_length_delimited(&mut self) -> Result<&'a [u8], ProtocolError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len)
            .map_err(|_| ProtocolError::corrupt("length prefix too large"))?;
        self.take(len)
    }

    pub fn read_fixed32(&mut self) -> Result<u32, ProtocolError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_fixed64(&mut self) -> Result<u64, ProtocolError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    /// Skips the value of a field whose key has already been read.
    pub fn skip(
        &mut self,
        field: u32,
        wire_type: WireType,
    ) -> Result<(), ProtocolError> {
        match wire_type {
            WireType::Varint => self.read_varint().map(drop),
            WireType::Fixed64 => self.take(8).map(drop),
            WireType::Fixed32 => self.take(4).map(drop),
            WireType::LengthDelimited => self.read_length_delimited().map(drop),
            WireType::StartGroup => loop {
                let (inner, inner_type) = self.read_key()?;
                if inner_type == WireType::EndGroup {
                    if inner != field {
                        return Err(ProtocolError::corrupt(
                            "mismatched end group",
                        ));
                    }
                    return Ok(());
                }
                self.skip(inner, inner_type)?;
            },
            WireType::EndGroup => {
                Err(ProtocolError::corrupt("unexpected end group"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_known_encodings() {
        let mut buf = Vec::new();
        put_varint(&mut buf, 1);
        assert_eq!(buf, [0x01]);

        buf.clear();
        put_varint(&mut buf, 300);
        assert_eq!(buf, [0xac, 0x02]);

        buf.clear();
        put_varint(&mut buf, u64::MAX);
        assert_eq!(buf.len(), MAX_VARINT_LEN);
        assert_eq!(Reader::new(&buf).read_varint().unwrap(), u64::MAX);
    }

    #[test]
    fn test_varint_truncated_is_corrupt() {
        let err = Reader::new(&[0x80, 0x80]).read_varint().unwrap_err();
        assert!(matches!(err, ProtocolError::FrameCorrupt(_)));
    }

    #[test]
    fn test_varint_overflow_is_corrupt() {
        let bytes = [0xff; 11];
        assert!(Reader::new(&bytes).read_varint().is_err());
    }

    #[test]
    fn test_key_layout() {
        let mut buf = Vec::new();
        put_key(&mut buf, 2, WireType::LengthDelimited);
        assert_eq!(buf, [0x12]);

        let (field, wire_type) = Reader::new(&buf).read_key().unwrap();
        assert_eq!(field, 2);
        assert_eq!(wire_type, WireType::LengthDelimited);
    }

    #[test]
    fn test_field_number_zero_is_corrupt() {
        assert!(Reader::new(&[0x02]).read_key().is_err());
    }

    #[test]
    fn test_invalid_wire_type_is_corrupt() {
        // field 1, wire type 7
        assert!(Reader::new(&[0x0f]).read_key().is_err());
    }

    #[test]
    fn test_length_delimited_past_end_is_corrupt() {
        let err = Reader::new(&[0x05, b'a', b'b'])
            .read_length_delimited()
            .unwrap_err();
        assert!(matches!(err, ProtocolError::FrameCorrupt(_)));
    }

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag_encode32(0), 0);
        assert_eq!(zigzag_encode32(-1), 1);
        assert_eq!(zigzag_encode32(1), 2);
        assert_eq!(zigzag_encode32(i32::MIN), u32::MAX);
        assert_eq!(zigzag_decode32(zigzag_encode32(-12345)), -12345);
        assert_eq!(zigzag_decode64(zigzag_encode64(i64::MIN)), i64::MIN);
    }

    #[test]
    fn test_fixed_width_little_endian() {
        let mut buf = Vec::new();
        put_fixed32(&mut buf, 0x0102_0304);
        put_fixed64(&mut buf, 7);
        assert_eq!(&buf[..4], &[4, 3, 2, 1]);

        let mut reader = Reader::new(&buf);
        assert_eq!(reader.read_fixed32().unwrap(), 0x0102_0304);
        assert_eq!(reader.read_fixed64().unwrap(), 7);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_skip_every_wire_type() {
        let mut buf = Vec::new();
        put_key(&mut buf, 1, WireType::Varint);
        put_varint(&mut buf, 150);
        put_key(&mut buf, 2, WireType::Fixed64);
        put_fixed64(&mut buf, 1);
        put_length_delimited(&mut buf, 3, b"abc");
        put_key(&mut buf, 4, WireType::Fixed32);
        put_fixed32(&mut buf, 1);
        put_key(&mut buf, 5, WireType::StartGroup);
        put_key(&mut buf, 1, WireType::Varint);
        put_varint(&mut buf, 9);
        put_key(&mut buf, 5, WireType::EndGroup);

        let mut reader = Reader::new(&buf);
        while !reader.is_empty() {
            let (field, wire_type) = reader.read_key().unwrap();
            reader.skip(field, wire_type).unwrap();
        }
    }
}
