//! Error types for CDR encoding and decoding

pub type Result<T> = std::result::Result<T, CdrError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CdrError {
    #[error("payload truncated: needed {needed} more byte(s) at offset {offset}")]
    TruncatedPayload { offset: usize, needed: usize },

    #[error("field '{field}' holds {actual} element(s), bound is {bound}")]
    FieldOutOfBounds {
        field: String,
        bound: usize,
        actual: usize,
    },

    #[error("field '{field}' has unsupported type {type_name}")]
    UnsupportedType { field: String, type_name: String },

    #[error("field '{field}': expected {expected}")]
    TypeMismatch { field: String, expected: String },

    #[error("missing field '{0}'")]
    MissingField(String),

    #[error("message has no field named '{0}'")]
    UnknownField(String),

    #[error("unsupported CDR encapsulation {0:02x?}")]
    InvalidEncapsulation([u8; 2]),

    #[error("invalid data at offset {offset}: {reason}")]
    InvalidData { offset: usize, reason: String },
}
