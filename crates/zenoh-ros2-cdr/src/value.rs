//! Runtime representation of ROS 2 message values.

use tracing::warn;
use zenoh_ros2_schema::{ElementType, FieldKind, Primitive, TypeDescriptor, EMPTY_STRUCT_MEMBER};

/// Any value a message field can hold.
#[derive(Clone, Debug, PartialEq)]
pub enum WireValue {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    /// Also used for `byte` and `char`.
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    /// `uint8`/`byte`/`char` arrays and sequences.
    Bytes(Vec<u8>),
    Message(WireMessage),
    Array(Vec<WireValue>),
}

macro_rules! impl_primitive_accessors {
    ($($method:ident -> $variant:ident : $ty:ty),* $(,)?) => {
        impl WireValue {
            $(
                pub fn $method(&self) -> Option<$ty> {
                    match self {
                        WireValue::$variant(v) => Some(*v),
                        _ => None,
                    }
                }
            )*
        }
    };
}

impl_primitive_accessors! {
    as_bool -> Bool: bool,
    as_i8 -> Int8: i8,
    as_i16 -> Int16: i16,
    as_i32 -> Int32: i32,
    as_i64 -> Int64: i64,
    as_u8 -> Uint8: u8,
    as_u16 -> Uint16: u16,
    as_u32 -> Uint32: u32,
    as_u64 -> Uint64: u64,
    as_f32 -> Float32: f32,
    as_f64 -> Float64: f64,
}

impl WireValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            WireValue::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&WireMessage> {
        match self {
            WireValue::Message(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[WireValue]> {
        match self {
            WireValue::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            WireValue::Bool(_) => "bool",
            WireValue::Int8(_) => "int8",
            WireValue::Int16(_) => "int16",
            WireValue::Int32(_) => "int32",
            WireValue::Int64(_) => "int64",
            WireValue::Uint8(_) => "uint8",
            WireValue::Uint16(_) => "uint16",
            WireValue::Uint32(_) => "uint32",
            WireValue::Uint64(_) => "uint64",
            WireValue::Float32(_) => "float32",
            WireValue::Float64(_) => "float64",
            WireValue::String(_) => "string",
            WireValue::Bytes(_) => "bytes",
            WireValue::Message(_) => "message",
            WireValue::Array(_) => "array",
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for WireValue {
                fn from(v: $ty) -> Self {
                    WireValue::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    u64 => Uint64,
    f32 => Float32,
    f64 => Float64,
    String => String,
    Vec<u8> => Bytes,
    WireMessage => Message,
    Vec<WireValue> => Array,
}

impl From<&str> for WireValue {
    fn from(v: &str) -> Self {
        WireValue::String(v.to_string())
    }
}

/// A message as `(field, value)` pairs kept in insertion order.
///
/// Field order is not significant for equality.
#[derive(Clone, Debug, Default)]
pub struct WireMessage {
    fields: Vec<(String, WireValue)>,
}

impl PartialEq for WireMessage {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(name, value)| other.field(name) == Some(value))
    }
}

impl WireMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`WireMessage::set`].
    pub fn with(mut self, name: &str, value: impl Into<WireValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a field, replacing an existing value in place.
    pub fn set(&mut self, name: &str, value: impl Into<WireValue>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    /// Field by name. Dots descend into nested messages (`linear.x`).
    pub fn get(&self, path: &str) -> Option<&WireValue> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let value = self
            .fields
            .iter()
            .find(|(n, _)| n == head)
            .map(|(_, v)| v)?;
        match rest {
            Some(rest) => value.as_message()?.get(rest),
            None => Some(value),
        }
    }

    fn field(&self, name: &str) -> Option<&WireValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut WireValue> {
        self.fields
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, name: &str) -> Option<WireValue> {
        let idx = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &WireValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// A message with every field of `desc` set to its declared default,
    /// or to zero / empty when none is declared. Byte-like collections are
    /// [`WireValue::Bytes`].
    pub fn default_for(desc: &TypeDescriptor) -> Self {
        let fields = desc
            .fields()
            .iter()
            .filter(|field| field.name != EMPTY_STRUCT_MEMBER)
            .map(|field| {
                let declared = field
                    .default_value
                    .as_deref()
                    .and_then(|text| match parse_default(&field.kind, text) {
                        Some(value) => Some(value),
                        None => {
                            warn!(
                                "ignoring unparsable default '{}' for {}.{}",
                                text,
                                desc.name(),
                                field.name
                            );
                            None
                        }
                    });
                let value = declared.unwrap_or_else(|| zero_for_kind(&field.kind));
                (field.name.clone(), value)
            })
            .collect();
        Self { fields }
    }
}

impl FromIterator<(String, WireValue)> for WireMessage {
    fn from_iter<I: IntoIterator<Item = (String, WireValue)>>(iter: I) -> Self {
        let mut msg = WireMessage::new();
        for (name, value) in iter {
            msg.set(&name, value);
        }
        msg
    }
}

pub(crate) fn is_byte_like(element: &ElementType) -> bool {
    matches!(
        element,
        ElementType::Primitive(Primitive::Uint8 | Primitive::Byte | Primitive::Char)
    )
}

fn zero_for_element(element: &ElementType) -> WireValue {
    match element {
        ElementType::Primitive(p) => match p {
            Primitive::Bool => WireValue::Bool(false),
            Primitive::Byte | Primitive::Char | Primitive::Uint8 => WireValue::Uint8(0),
            Primitive::Int8 => WireValue::Int8(0),
            Primitive::Int16 => WireValue::Int16(0),
            Primitive::Uint16 => WireValue::Uint16(0),
            Primitive::Int32 => WireValue::Int32(0),
            Primitive::Uint32 => WireValue::Uint32(0),
            Primitive::Int64 => WireValue::Int64(0),
            Primitive::Uint64 => WireValue::Uint64(0),
            Primitive::Float32 => WireValue::Float32(0.0),
            Primitive::Float64 => WireValue::Float64(0.0),
            Primitive::String | Primitive::WString => WireValue::String(String::new()),
        },
        ElementType::BoundedString(_) | ElementType::BoundedWString(_) => {
            WireValue::String(String::new())
        }
        ElementType::Nested(nested) => WireValue::Message(WireMessage::default_for(nested)),
    }
}

fn zero_for_kind(kind: &FieldKind) -> WireValue {
    match kind {
        FieldKind::Scalar(e) => zero_for_element(e),
        FieldKind::Array(e, n) if is_byte_like(e) => WireValue::Bytes(vec![0; *n]),
        FieldKind::Array(e, n) => WireValue::Array(vec![zero_for_element(e); *n]),
        FieldKind::BoundedSequence(e, _) | FieldKind::Sequence(e) if is_byte_like(e) => {
            WireValue::Bytes(Vec::new())
        }
        FieldKind::BoundedSequence(..) | FieldKind::Sequence(_) => WireValue::Array(Vec::new()),
    }
}

fn unquote(text: &str) -> Option<&str> {
    let text = text.trim();
    ['"', '\'']
        .iter()
        .find_map(|q| text.strip_prefix(*q)?.strip_suffix(*q))
}

fn parse_scalar(element: &ElementType, text: &str) -> Option<WireValue> {
    let text = text.trim();
    let value = match element {
        ElementType::Primitive(p) => match p {
            Primitive::Bool => match text {
                "true" | "True" | "1" => WireValue::Bool(true),
                "false" | "False" | "0" => WireValue::Bool(false),
                _ => return None,
            },
            Primitive::Byte | Primitive::Char | Primitive::Uint8 => WireValue::Uint8(text.parse().ok()?),
            Primitive::Int8 => WireValue::Int8(text.parse().ok()?),
            Primitive::Int16 => WireValue::Int16(text.parse().ok()?),
            Primitive::Uint16 => WireValue::Uint16(text.parse().ok()?),
            Primitive::Int32 => WireValue::Int32(text.parse().ok()?),
            Primitive::Uint32 => WireValue::Uint32(text.parse().ok()?),
            Primitive::Int64 => WireValue::Int64(text.parse().ok()?),
            Primitive::Uint64 => WireValue::Uint64(text.parse().ok()?),
            Primitive::Float32 => WireValue::Float32(text.parse().ok()?),
            Primitive::Float64 => WireValue::Float64(text.parse().ok()?),
            Primitive::String | Primitive::WString => {
                WireValue::String(unquote(text).unwrap_or(text).to_string())
            }
        },
        ElementType::BoundedString(_) | ElementType::BoundedWString(_) => {
            WireValue::String(unquote(text).unwrap_or(text).to_string())
        }
        ElementType::Nested(_) => return None,
    };
    Some(value)
}

fn parse_default(kind: &FieldKind, text: &str) -> Option<WireValue> {
    match kind {
        FieldKind::Scalar(e) => parse_scalar(e, text),
        _ => {
            let element = kind.element();
            let inner = text.trim().strip_prefix('[')?.strip_suffix(']')?.trim();
            let items: Vec<WireValue> = if inner.is_empty() {
                Vec::new()
            } else {
                inner
                    .split(',')
                    .map(|item| parse_scalar(element, item))
                    .collect::<Option<_>>()?
            };
            if let FieldKind::Array(_, n) = kind {
                if items.len() != *n {
                    return None;
                }
            }
            if is_byte_like(element) {
                items
                    .iter()
                    .map(WireValue::as_u8)
                    .collect::<Option<Vec<_>>>()
                    .map(WireValue::Bytes)
            } else {
                Some(WireValue::Array(items))
            }
        }
    }
}
