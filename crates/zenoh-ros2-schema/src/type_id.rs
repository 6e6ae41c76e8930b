//! ROS 2 field type IDs
//!
//! Type IDs follow `type_description_interfaces/msg/FieldType`:
//! - 1-22: Single values
//! - base + 48: Fixed arrays
//! - base + 96: Bounded sequences
//! - base + 144: Unbounded sequences

use crate::descriptor::{ElementType, FieldKind};
use crate::parser::Primitive;

/// Type ID constants matching `type_description_interfaces/msg/FieldType`.
pub struct TypeId;

impl TypeId {
    pub const NESTED_TYPE: u8 = 1;
    pub const INT8: u8 = 2;
    pub const UINT8: u8 = 3;
    pub const INT16: u8 = 4;
    pub const UINT16: u8 = 5;
    pub const INT32: u8 = 6;
    pub const UINT32: u8 = 7;
    pub const INT64: u8 = 8;
    pub const UINT64: u8 = 9;
    pub const FLOAT32: u8 = 10;
    pub const FLOAT64: u8 = 11;
    pub const BOOL: u8 = 15;
    pub const BYTE: u8 = 16;
    pub const STRING: u8 = 17;
    pub const WSTRING: u8 = 18;
    pub const BOUNDED_STRING: u8 = 21;
    pub const BOUNDED_WSTRING: u8 = 22;

    pub const FIXED_ARRAY_OFFSET: u8 = 48;
    pub const BOUNDED_SEQUENCE_OFFSET: u8 = 96;
    pub const UNBOUNDED_SEQUENCE_OFFSET: u8 = 144;

    /// uint8/char (fixed array), used by `service_msgs/msg/ServiceEventInfo.client_gid`
    pub const UINT8_ARRAY: u8 = Self::UINT8 + Self::FIXED_ARRAY_OFFSET;
    /// Nested message type (bounded sequence), used by service event messages
    pub const NESTED_TYPE_BOUNDED_SEQUENCE: u8 = Self::NESTED_TYPE + Self::BOUNDED_SEQUENCE_OFFSET;

    /// Type ID of a single element.
    ///
    /// `char` is an alias of `uint8` in `.msg` files, while `byte` maps to the
    /// IDL `octet` type.
    pub fn of_element(element: &ElementType) -> u8 {
        match element {
            ElementType::Primitive(p) => match p {
                Primitive::Bool => Self::BOOL,
                Primitive::Byte => Self::BYTE,
                Primitive::Char | Primitive::Uint8 => Self::UINT8,
                Primitive::Int8 => Self::INT8,
                Primitive::Int16 => Self::INT16,
                Primitive::Uint16 => Self::UINT16,
                Primitive::Int32 => Self::INT32,
                Primitive::Uint32 => Self::UINT32,
                Primitive::Int64 => Self::INT64,
                Primitive::Uint64 => Self::UINT64,
                Primitive::Float32 => Self::FLOAT32,
                Primitive::Float64 => Self::FLOAT64,
                Primitive::String => Self::STRING,
                Primitive::WString => Self::WSTRING,
            },
            ElementType::BoundedString(_) => Self::BOUNDED_STRING,
            ElementType::BoundedWString(_) => Self::BOUNDED_WSTRING,
            ElementType::Nested(_) => Self::NESTED_TYPE,
        }
    }

    /// Type ID of a field, including its collection offset.
    pub fn of_field(kind: &FieldKind) -> u8 {
        let base = Self::of_element(kind.element());
        match kind {
            FieldKind::Scalar(_) => base,
            FieldKind::Array(..) => base + Self::FIXED_ARRAY_OFFSET,
            FieldKind::BoundedSequence(..) => base + Self::BOUNDED_SEQUENCE_OFFSET,
            FieldKind::Sequence(_) => base + Self::UNBOUNDED_SEQUENCE_OFFSET,
        }
    }
}
