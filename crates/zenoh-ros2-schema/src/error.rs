//! Error types for interface parsing and hashing

pub type Result<T> = std::result::Result<T, SchemaError>;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("line {line}: malformed field definition '{text}'")]
    MalformedLine { line: usize, text: String },

    #[error("line {line}: unknown primitive type '{name}'")]
    UnknownPrimitive { line: usize, name: String },

    #[error("line {line}: invalid bound in '{text}'")]
    InvalidBound { line: usize, text: String },

    #[error("field '{field}' is declared more than once in {type_name}")]
    DuplicateField { type_name: String, field: String },

    #[error("type '{0}' could not be resolved")]
    UnresolvedType(String),

    #[error("cyclic type definition: {}", .0.join(" -> "))]
    CyclicType(Vec<String>),

    #[error("invalid type name '{0}': expected 'package/msg/Name' or 'package/srv/Name'")]
    InvalidTypeName(String),

    #[error("service definition for '{0}' has no '---' separator")]
    MissingServiceSeparator(String),

    #[error("invalid RIHS01 hash '{0}'")]
    InvalidHash(String),

    #[error("failed to serialize type description: {0}")]
    Json(#[from] serde_json::Error),
}
