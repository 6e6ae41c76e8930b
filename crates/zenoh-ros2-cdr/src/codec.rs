//! Schema-driven CDR encoding of [`WireMessage`]s.
//!
//! Payloads start with the 4-byte encapsulation header; alignment is
//! relative to the byte following it. Nested messages are written inline
//! with no padding of their own.

use byteorder::LittleEndian;
use zenoh_ros2_schema::{
    ElementType, FieldDescriptor, FieldKind, Primitive, TypeDescriptor, EMPTY_STRUCT_MEMBER,
};

use crate::error::{CdrError, Result};
use crate::primitives::{CdrReader, CdrWriter};
use crate::value::{is_byte_like, WireMessage, WireValue};

/// CDR little-endian encapsulation header.
pub const CDR_HEADER_LE: [u8; 4] = [0x00, 0x01, 0x00, 0x00];

type Writer<'a> = CdrWriter<'a, LittleEndian>;
type Reader<'a> = CdrReader<'a, LittleEndian>;

fn path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

/// Encode `msg` as a complete payload (header included).
///
/// Every field of `desc` must be present in `msg`. Fields of `msg` unknown
/// to `desc` are rejected, and so is the placeholder member of empty
/// messages, which is written implicitly. Byte-like collections
/// (`uint8`, `byte`, `char`) must be given as [`WireValue::Bytes`].
pub fn encode(desc: &TypeDescriptor, msg: &WireMessage) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(64);
    buffer.extend_from_slice(&CDR_HEADER_LE);
    let mut writer = Writer::new(&mut buffer);
    encode_message(desc, msg, "", &mut writer)?;
    Ok(buffer)
}

/// Decode a complete payload (header included) against `desc`.
pub fn decode(desc: &TypeDescriptor, payload: &[u8]) -> Result<WireMessage> {
    let Some((header, body)) = payload.split_first_chunk::<4>() else {
        return Err(CdrError::TruncatedPayload {
            offset: 0,
            needed: 4 - payload.len(),
        });
    };
    if header[..2] != CDR_HEADER_LE[..2] {
        return Err(CdrError::InvalidEncapsulation([header[0], header[1]]));
    }
    let mut reader = Reader::new(body);
    decode_message(desc, "", &mut reader)
}

fn encode_message(
    desc: &TypeDescriptor,
    msg: &WireMessage,
    parent: &str,
    writer: &mut Writer<'_>,
) -> Result<()> {
    if let Some((name, _)) = msg
        .iter()
        .find(|(name, _)| *name == EMPTY_STRUCT_MEMBER || desc.field(name).is_none())
    {
        return Err(CdrError::UnknownField(path(parent, name)));
    }
    for field in desc.fields() {
        if field.name == EMPTY_STRUCT_MEMBER {
            writer.write_u8(0);
            continue;
        }
        match msg.get(&field.name) {
            Some(value) => encode_field(field, value, parent, writer)?,
            None => return Err(CdrError::MissingField(path(parent, &field.name))),
        }
    }
    Ok(())
}

fn encode_field(
    field: &FieldDescriptor,
    value: &WireValue,
    parent: &str,
    writer: &mut Writer<'_>,
) -> Result<()> {
    let name = path(parent, &field.name);
    let element = field.kind.element();
    match &field.kind {
        FieldKind::Scalar(element) => encode_element(element, value, &name, writer),
        FieldKind::Array(_, n) => {
            let len = collection_len(element, value, &name)?;
            if len != *n {
                return Err(CdrError::FieldOutOfBounds {
                    field: name,
                    bound: *n,
                    actual: len,
                });
            }
            encode_items(element, value, &name, writer)
        }
        FieldKind::BoundedSequence(_, bound) => {
            let len = collection_len(element, value, &name)?;
            if len > *bound {
                return Err(CdrError::FieldOutOfBounds {
                    field: name,
                    bound: *bound,
                    actual: len,
                });
            }
            writer.write_sequence_length(len);
            encode_items(element, value, &name, writer)
        }
        FieldKind::Sequence(_) => {
            let len = collection_len(element, value, &name)?;
            writer.write_sequence_length(len);
            encode_items(element, value, &name, writer)
        }
    }
}

fn collection_len(element: &ElementType, value: &WireValue, name: &str) -> Result<usize> {
    // Byte-like collections have a single representation so that decoding
    // gives back what was encoded.
    let expected = if is_byte_like(element) { "bytes" } else { "array" };
    match value {
        WireValue::Bytes(bytes) if is_byte_like(element) => Ok(bytes.len()),
        WireValue::Array(items) if !is_byte_like(element) => Ok(items.len()),
        other => Err(CdrError::TypeMismatch {
            field: name.to_string(),
            expected: format!("{expected}, got {}", other.kind_name()),
        }),
    }
}

fn encode_items(
    element: &ElementType,
    value: &WireValue,
    name: &str,
    writer: &mut Writer<'_>,
) -> Result<()> {
    match value {
        WireValue::Bytes(bytes) => writer.write_raw(bytes),
        WireValue::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                encode_element(element, item, &format!("{name}[{i}]"), writer)?;
            }
        }
        // collection_len already rejected everything else
        _ => {}
    }
    Ok(())
}

fn encode_element(
    element: &ElementType,
    value: &WireValue,
    name: &str,
    writer: &mut Writer<'_>,
) -> Result<()> {
    let mismatch = |expected: &str| CdrError::TypeMismatch {
        field: name.to_string(),
        expected: format!("{expected}, got {}", value.kind_name()),
    };

    match (element, value) {
        (ElementType::Primitive(p), value) => match (p, value) {
            (Primitive::Bool, WireValue::Bool(v)) => writer.write_bool(*v),
            (Primitive::Byte | Primitive::Char | Primitive::Uint8, WireValue::Uint8(v)) => {
                writer.write_u8(*v)
            }
            (Primitive::Int8, WireValue::Int8(v)) => writer.write_i8(*v),
            (Primitive::Int16, WireValue::Int16(v)) => writer.write_i16(*v),
            (Primitive::Uint16, WireValue::Uint16(v)) => writer.write_u16(*v),
            (Primitive::Int32, WireValue::Int32(v)) => writer.write_i32(*v),
            (Primitive::Uint32, WireValue::Uint32(v)) => writer.write_u32(*v),
            (Primitive::Int64, WireValue::Int64(v)) => writer.write_i64(*v),
            (Primitive::Uint64, WireValue::Uint64(v)) => writer.write_u64(*v),
            (Primitive::Float32, WireValue::Float32(v)) => writer.write_f32(*v),
            (Primitive::Float64, WireValue::Float64(v)) => writer.write_f64(*v),
            (Primitive::String, WireValue::String(v)) => writer.write_string(v),
            (Primitive::WString, _) => return Err(unsupported(element, name)),
            (p, _) => return Err(mismatch(&p.to_string())),
        },
        (ElementType::BoundedString(bound), WireValue::String(v)) => {
            let len = v.len();
            if len > *bound {
                return Err(CdrError::FieldOutOfBounds {
                    field: name.to_string(),
                    bound: *bound,
                    actual: len,
                });
            }
            writer.write_string(v);
        }
        (ElementType::BoundedString(bound), _) => return Err(mismatch(&format!("string<={bound}"))),
        (ElementType::BoundedWString(_), _) => return Err(unsupported(element, name)),
        (ElementType::Nested(nested), WireValue::Message(msg)) => {
            encode_message(nested, msg, name, writer)?
        }
        (ElementType::Nested(nested), _) => return Err(mismatch(&nested.name().to_string())),
    }
    Ok(())
}

fn unsupported(element: &ElementType, name: &str) -> CdrError {
    let type_name = match element {
        ElementType::BoundedWString(n) => format!("wstring<={n}"),
        _ => "wstring".to_string(),
    };
    CdrError::UnsupportedType {
        field: name.to_string(),
        type_name,
    }
}

fn decode_message(desc: &TypeDescriptor, parent: &str, reader: &mut Reader<'_>) -> Result<WireMessage> {
    let mut msg = WireMessage::new();
    for field in desc.fields() {
        let value = decode_field(field, parent, reader)?;
        if field.name != EMPTY_STRUCT_MEMBER {
            msg.set(&field.name, value);
        }
    }
    Ok(msg)
}

/// Smallest number of bytes one element can occupy, used to reject
/// sequence lengths the payload cannot hold.
fn min_size(element: &ElementType) -> usize {
    match element {
        ElementType::Primitive(Primitive::String | Primitive::WString)
        | ElementType::BoundedString(_)
        | ElementType::BoundedWString(_) => 4,
        ElementType::Primitive(p) => p.alignment(),
        ElementType::Nested(_) => 1,
    }
}

fn decode_field(field: &FieldDescriptor, parent: &str, reader: &mut Reader<'_>) -> Result<WireValue> {
    let name = path(parent, &field.name);
    let element = field.kind.element();
    let count = match &field.kind {
        FieldKind::Scalar(element) => return decode_element(element, &name, reader),
        FieldKind::Array(_, n) => *n,
        FieldKind::BoundedSequence(_, bound) => {
            let len = reader.read_sequence_length(min_size(element))?;
            if len > *bound {
                return Err(CdrError::FieldOutOfBounds {
                    field: name,
                    bound: *bound,
                    actual: len,
                });
            }
            len
        }
        FieldKind::Sequence(_) => reader.read_sequence_length(min_size(element))?,
    };

    if is_byte_like(element) {
        return Ok(WireValue::Bytes(reader.read_bytes(count)?.to_vec()));
    }
    let mut items = Vec::with_capacity(count);
    for i in 0..count {
        items.push(decode_element(element, &format!("{name}[{i}]"), reader)?);
    }
    Ok(WireValue::Array(items))
}

fn decode_element(element: &ElementType, name: &str, reader: &mut Reader<'_>) -> Result<WireValue> {
    let value = match element {
        ElementType::Primitive(p) => match p {
            Primitive::Bool => WireValue::Bool(reader.read_bool()?),
            Primitive::Byte | Primitive::Char | Primitive::Uint8 => WireValue::Uint8(reader.read_u8()?),
            Primitive::Int8 => WireValue::Int8(reader.read_i8()?),
            Primitive::Int16 => WireValue::Int16(reader.read_i16()?),
            Primitive::Uint16 => WireValue::Uint16(reader.read_u16()?),
            Primitive::Int32 => WireValue::Int32(reader.read_i32()?),
            Primitive::Uint32 => WireValue::Uint32(reader.read_u32()?),
            Primitive::Int64 => WireValue::Int64(reader.read_i64()?),
            Primitive::Uint64 => WireValue::Uint64(reader.read_u64()?),
            Primitive::Float32 => WireValue::Float32(reader.read_f32()?),
            Primitive::Float64 => WireValue::Float64(reader.read_f64()?),
            Primitive::String => WireValue::String(reader.read_string()?),
            Primitive::WString => return Err(unsupported(element, name)),
        },
        ElementType::BoundedString(bound) => {
            let s = reader.read_string()?;
            let len = s.len();
            if len > *bound {
                return Err(CdrError::FieldOutOfBounds {
                    field: name.to_string(),
                    bound: *bound,
                    actual: len,
                });
            }
            WireValue::String(s)
        }
        ElementType::BoundedWString(_) => return Err(unsupported(element, name)),
        ElementType::Nested(nested) => WireValue::Message(decode_message(nested, name, reader)?),
    };
    Ok(value)
}
