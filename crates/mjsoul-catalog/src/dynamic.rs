//! Schema-driven conversion between JSON objects and protobuf bytes.
//!
//! Values are `serde_json::Value` objects keyed by field name. Encoding
//! writes fields in field-number order and leaves out singular scalars
//! that hold their proto3 default. Decoding returns only the fields that
//! were present on the wire.
//!
//! | proto type            | JSON in                          | JSON out        |
//! |-----------------------|----------------------------------|-----------------|
//! | 32-bit ints, bool     | number / bool                    | number / bool   |
//! | 64-bit ints           | number or decimal string         | number          |
//! | float, double         | number                           | number (NaN → null) |
//! | string                | string                           | string          |
//! | bytes                 | array of octets or string        | array of octets |
//! | enum                  | number or value name             | number          |
//! | message               | object                           | object          |
//! | repeated T            | array                            | array           |

use mjsoul_protocol::wire::{self, Reader, WireType};
use mjsoul_protocol::ProtocolError;
use serde_json::{Map, Number, Value};

use crate::schema::{FieldSchema, FieldType, MessageSchema, ScalarType};
use crate::{SchemaError, ServiceCatalog};

/// Deepest message nesting accepted in either direction.
pub const MAX_DEPTH: usize = 64;

pub(crate) fn encode(
    catalog: &ServiceCatalog,
    schema: &MessageSchema,
    value: &Value,
) -> Result<Vec<u8>, SchemaError> {
    let mut buf = Vec::new();
    encode_message(catalog, schema, value, 0, &mut buf)?;
    Ok(buf)
}

pub(crate) fn decode(
    catalog: &ServiceCatalog,
    schema: &MessageSchema,
    bytes: &[u8],
) -> Result<Value, SchemaError> {
    decode_message(catalog, schema, bytes, 0)
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// A single scalar ready to be written.
enum Encoded {
    Varint(u64),
    Fixed32(u32),
    Fixed64(u64),
    Bytes(Vec<u8>),
}

impl Encoded {
    fn is_default(&self) -> bool {
        match self {
            Self::Varint(v) | Self::Fixed64(v) => *v == 0,
            Self::Fixed32(v) => *v == 0,
            Self::Bytes(b) => b.is_empty(),
        }
    }

    /// Writes the bare value, without a key.
    fn put(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Varint(v) => wire::put_varint(buf, *v),
            Self::Fixed32(v) => wire::put_fixed32(buf, *v),
            Self::Fixed64(v) => wire::put_fixed64(buf, *v),
            Self::Bytes(b) => {
                wire::put_varint(buf, b.len() as u64);
                buf.extend_from_slice(b);
            }
        }
    }
}

fn encode_message(
    catalog: &ServiceCatalog,
    schema: &MessageSchema,
    value: &Value,
    depth: usize,
    buf: &mut Vec<u8>,
) -> Result<(), SchemaError> {
    if depth > MAX_DEPTH {
        return Err(SchemaError::RecursionLimit(MAX_DEPTH));
    }
    let object = match value {
        Value::Object(object) => object,
        Value::Null => return Ok(()),
        _ => return Err(SchemaError::invalid(&schema.name, "an object")),
    };

    if let Some(key) = object.keys().find(|key| schema.field(key).is_none()) {
        return Err(SchemaError::UnknownField {
            message: schema.name.clone(),
            field: key.clone(),
        });
    }

    for field in schema.fields() {
        match object.get(&field.name) {
            None | Some(Value::Null) => {}
            Some(value) if field.repeated => {
                encode_repeated(catalog, field, value, depth, buf)?;
            }
            Some(value) => encode_singular(catalog, field, value, depth, buf)?,
        }
    }
    Ok(())
}

fn encode_singular(
    catalog: &ServiceCatalog,
    field: &FieldSchema,
    value: &Value,
    depth: usize,
    buf: &mut Vec<u8>,
) -> Result<(), SchemaError> {
    if let FieldType::Message(name) = &field.ty {
        let nested = encode_nested(catalog, name, value, depth)?;
        wire::put_length_delimited(buf, field.number, &nested);
        return Ok(());
    }
    let encoded = encode_value(catalog, field, value)?;
    if !encoded.is_default() {
        wire::put_key(buf, field.number, field.ty.wire_type());
        encoded.put(buf);
    }
    Ok(())
}

fn encode_repeated(
    catalog: &ServiceCatalog,
    field: &FieldSchema,
    value: &Value,
    depth: usize,
    buf: &mut Vec<u8>,
) -> Result<(), SchemaError> {
    let items = value
        .as_array()
        .ok_or_else(|| SchemaError::invalid(&field.name, "an array"))?;
    if items.is_empty() {
        return Ok(());
    }

    if field.ty.is_packable() {
        let mut packed = Vec::new();
        for item in items {
            encode_value(catalog, field, item)?.put(&mut packed);
        }
        wire::put_length_delimited(buf, field.number, &packed);
        return Ok(());
    }

    for item in items {
        if let FieldType::Message(name) = &field.ty {
            let nested = encode_nested(catalog, name, item, depth)?;
            wire::put_length_delimited(buf, field.number, &nested);
        } else {
            wire::put_key(buf, field.number, field.ty.wire_type());
            encode_value(catalog, field, item)?.put(buf);
        }
    }
    Ok(())
}

fn encode_nested(
    catalog: &ServiceCatalog,
    message_name: &str,
    value: &Value,
    depth: usize,
) -> Result<Vec<u8>, SchemaError> {
    let schema = catalog.message_by_full_name(message_name)?;
    let mut nested = Vec::new();
    encode_message(catalog, schema, value, depth + 1, &mut nested)?;
    Ok(nested)
}

/// Converts one non-message value to its wire form.
fn encode_value(
    catalog: &ServiceCatalog,
    field: &FieldSchema,
    value: &Value,
) -> Result<Encoded, SchemaError> {
    let name = field.name.as_str();
    match &field.ty {
        FieldType::Scalar(scalar) => encode_scalar(name, *scalar, value),
        FieldType::Enum(enum_name) => {
            let number = match value {
                Value::String(label) => catalog
                    .enum_by_full_name(enum_name)
                    .and_then(|schema| schema.value_of(label))
                    .ok_or_else(|| SchemaError::invalid(name, "a known enum value"))?,
                _ => to_i32(name, value)?,
            };
            Ok(Encoded::Varint(i64::from(number) as u64))
        }
        FieldType::Message(_) => {
            Err(SchemaError::invalid(name, "a scalar"))
        }
    }
}

fn encode_scalar(
    name: &str,
    scalar: ScalarType,
    value: &Value,
) -> Result<Encoded, SchemaError> {
    Ok(match scalar {
        ScalarType::Int32 => Encoded::Varint(i64::from(to_i32(name, value)?) as u64),
        ScalarType::Int64 => Encoded::Varint(to_i64(name, value)? as u64),
        ScalarType::Uint32 => Encoded::Varint(u64::from(to_u32(name, value)?)),
        ScalarType::Uint64 => Encoded::Varint(to_u64(name, value)?),
        ScalarType::Sint32 => {
            Encoded::Varint(u64::from(wire::zigzag_encode32(to_i32(name, value)?)))
        }
        ScalarType::Sint64 => {
            Encoded::Varint(wire::zigzag_encode64(to_i64(name, value)?))
        }
        ScalarType::Fixed32 => Encoded::Fixed32(to_u32(name, value)?),
        ScalarType::Fixed64 => Encoded::Fixed64(to_u64(name, value)?),
        ScalarType::Sfixed32 => Encoded::Fixed32(to_i32(name, value)? as u32),
        ScalarType::Sfixed64 => Encoded::Fixed64(to_i64(name, value)? as u64),
        ScalarType::Bool => {
            let flag = value
                .as_bool()
                .ok_or_else(|| SchemaError::invalid(name, "a bool"))?;
            Encoded::Varint(u64::from(flag))
        }
        ScalarType::Float => Encoded::Fixed32((to_f64(name, value)? as f32).to_bits()),
        ScalarType::Double => Encoded::Fixed64(to_f64(name, value)?.to_bits()),
        ScalarType::String => {
            let text = value
                .as_str()
                .ok_or_else(|| SchemaError::invalid(name, "a string"))?;
            Encoded::Bytes(text.as_bytes().to_vec())
        }
        ScalarType::Bytes => Encoded::Bytes(to_bytes(name, value)?),
    })
}

fn to_i64(name: &str, value: &Value) -> Result<i64, SchemaError> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| SchemaError::invalid(name, "a signed integer"))
}

fn to_u64(name: &str, value: &Value) -> Result<u64, SchemaError> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| SchemaError::invalid(name, "an unsigned integer"))
}

fn to_i32(name: &str, value: &Value) -> Result<i32, SchemaError> {
    value
        .as_i64()
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| SchemaError::invalid(name, "a 32-bit signed integer"))
}

fn to_u32(name: &str, value: &Value) -> Result<u32, SchemaError> {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| SchemaError::invalid(name, "a 32-bit unsigned integer"))
}

fn to_f64(name: &str, value: &Value) -> Result<f64, SchemaError> {
    value
        .as_f64()
        .ok_or_else(|| SchemaError::invalid(name, "a number"))
}

fn to_bytes(name: &str, value: &Value) -> Result<Vec<u8>, SchemaError> {
    match value {
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| SchemaError::invalid(name, "an array of octets")),
        _ => Err(SchemaError::invalid(name, "bytes")),
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

fn decode_message(
    catalog: &ServiceCatalog,
    schema: &MessageSchema,
    bytes: &[u8],
    depth: usize,
) -> Result<Value, SchemaError> {
    if depth > MAX_DEPTH {
        return Err(SchemaError::RecursionLimit(MAX_DEPTH));
    }
    let mut object = Map::new();
    let mut reader = Reader::new(bytes);
    // Singular embedded messages, decoded once all their occurrences
    // are in. Occurrences merge, which is the same as decoding their
    // concatenation.
    let mut embedded: Vec<(&FieldSchema, &MessageSchema, Vec<u8>)> = Vec::new();

    while !reader.is_empty() {
        let (number, wire_type) = reader.read_key()?;
        let Some(field) = schema.field_by_number(number) else {
            reader.skip(number, wire_type)?;
            continue;
        };

        if field.repeated {
            let mut items = Vec::new();
            if wire_type == WireType::LengthDelimited && field.ty.is_packable() {
                let mut packed = Reader::new(reader.read_length_delimited()?);
                while !packed.is_empty() {
                    items.push(decode_value(catalog, field, &mut packed, depth)?);
                }
            } else {
                check_wire_type(field, wire_type)?;
                items.push(decode_value(catalog, field, &mut reader, depth)?);
            }
            let slot = object
                .entry(field.name.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(existing) = slot {
                existing.extend(items);
            }
        } else if let FieldType::Message(name) = &field.ty {
            check_wire_type(field, wire_type)?;
            let bytes = reader.read_length_delimited()?;
            match embedded.iter_mut().find(|(seen, ..)| seen.number == number) {
                Some((.., buf)) => buf.extend_from_slice(bytes),
                None => {
                    let nested = catalog.message_by_full_name(name)?;
                    // Holds the field's place in the output order.
                    object.insert(field.name.clone(), Value::Null);
                    embedded.push((field, nested, bytes.to_vec()));
                }
            }
        } else {
            check_wire_type(field, wire_type)?;
            let value = decode_value(catalog, field, &mut reader, depth)?;
            object.insert(field.name.clone(), value);
        }
    }

    for (field, nested, bytes) in embedded {
        let value = decode_message(catalog, nested, &bytes, depth + 1)?;
        object.insert(field.name.clone(), value);
    }
    Ok(Value::Object(object))
}

fn check_wire_type(
    field: &FieldSchema,
    wire_type: WireType,
) -> Result<(), ProtocolError> {
    if wire_type == field.ty.wire_type() {
        Ok(())
    } else {
        Err(ProtocolError::FrameCorrupt(format!(
            "field {} arrived as {wire_type:?}, declared {:?}",
            field.name,
            field.ty.wire_type()
        )))
    }
}

/// Reads one value of the field's element type.
fn decode_value(
    catalog: &ServiceCatalog,
    field: &FieldSchema,
    reader: &mut Reader<'_>,
    depth: usize,
) -> Result<Value, SchemaError> {
    let scalar = match &field.ty {
        FieldType::Message(name) => {
            let schema = catalog.message_by_full_name(name)?;
            let bytes = reader.read_length_delimited()?;
            return decode_message(catalog, schema, bytes, depth + 1);
        }
        // Unknown enum numbers are kept as-is.
        FieldType::Enum(_) => {
            return Ok(Value::from(reader.read_varint()? as i64 as i32));
        }
        FieldType::Scalar(scalar) => *scalar,
    };

    Ok(match scalar {
        ScalarType::Int32 => Value::from(reader.read_varint()? as i64 as i32),
        ScalarType::Int64 => Value::from(reader.read_varint()? as i64),
        ScalarType::Uint32 => Value::from(reader.read_varint()? as u32),
        ScalarType::Uint64 => Value::from(reader.read_varint()?),
        ScalarType::Sint32 => {
            Value::from(wire::zigzag_decode32(reader.read_varint()? as u32))
        }
        ScalarType::Sint64 => Value::from(wire::zigzag_decode64(reader.read_varint()?)),
        ScalarType::Fixed32 => Value::from(reader.read_fixed32()?),
        ScalarType::Fixed64 => Value::from(reader.read_fixed64()?),
        ScalarType::Sfixed32 => Value::from(reader.read_fixed32()? as i32),
        ScalarType::Sfixed64 => Value::from(reader.read_fixed64()? as i64),
        ScalarType::Bool => Value::Bool(reader.read_varint()? != 0),
        ScalarType::Float => {
            float_value(f64::from(f32::from_bits(reader.read_fixed32()?)))
        }
        ScalarType::Double => float_value(f64::from_bits(reader.read_fixed64()?)),
        ScalarType::String => {
            let bytes = reader.read_length_delimited()?;
            let text = std::str::from_utf8(bytes).map_err(|_| {
                ProtocolError::FrameCorrupt(format!(
                    "field {} is not valid UTF-8",
                    field.name
                ))
            })?;
            Value::String(text.to_string())
        }
        ScalarType::Bytes => Value::Array(
            reader
                .read_length_delimited()?
                .iter()
                .map(|b| Value::from(*b))
                .collect(),
        ),
    })
}

/// JSON has no NaN or infinity.
fn float_value(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}
