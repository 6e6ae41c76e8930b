//! Line parser for `.msg` and `.srv` interface definitions.
//!
//! This stage is purely syntactic: nested type references are kept as names
//! and resolved later by [`crate::descriptor`].

use std::collections::HashSet;

use crate::error::{Result, SchemaError};

/// Primitive keywords of the interface definition language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Primitive {
    Bool,
    Byte,
    Char,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float32,
    Float64,
    String,
    #[strum(serialize = "wstring")]
    WString,
}

impl Primitive {
    /// CDR alignment of a single value of this type.
    pub fn alignment(&self) -> usize {
        match self {
            Primitive::Bool
            | Primitive::Byte
            | Primitive::Char
            | Primitive::Int8
            | Primitive::Uint8 => 1,
            Primitive::Int16 | Primitive::Uint16 => 2,
            Primitive::Int32
            | Primitive::Uint32
            | Primitive::Float32
            | Primitive::String
            | Primitive::WString => 4,
            Primitive::Int64 | Primitive::Uint64 | Primitive::Float64 => 8,
        }
    }
}

/// Element type as written in the definition, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseRef {
    Primitive(Primitive),
    BoundedString(usize),
    BoundedWString(usize),
    /// Reference to another message (`Type`, `pkg/Type`, `pkg/msg/Type`).
    Named(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArraySpec {
    Single,
    Fixed(usize),
    Bounded(usize),
    Unbounded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    pub base: BaseRef,
    pub array: ArraySpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedField {
    pub name: String,
    pub type_ref: TypeRef,
    pub default_value: Option<String>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constant {
    pub const_type: String,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDefinition {
    pub fields: Vec<ParsedField>,
    pub constants: Vec<Constant>,
}

/// Remove a trailing `#` comment, ignoring `#` inside quoted default values.
pub fn strip_comment(line: &str) -> &str {
    let mut quote = None;
    for (idx, c) in line.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '#') => return &line[..idx],
            _ => {}
        }
    }
    line
}

fn is_field_name(s: &str) -> bool {
    s.starts_with(|c: char| c.is_ascii_alphabetic())
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_bound(text: &str, line: usize, full: &str) -> Result<usize> {
    match text.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(SchemaError::InvalidBound {
            line,
            text: full.to_string(),
        }),
    }
}

/// Parse a field type string (e.g. `uint8[]`, `geometry_msgs/Point[<=3]`, `string<=50`).
pub fn parse_type_ref(type_str: &str, line: usize) -> Result<TypeRef> {
    let malformed = || SchemaError::MalformedLine {
        line,
        text: type_str.to_string(),
    };

    let (base_str, array) = match type_str.find('[') {
        Some(idx) => {
            let inner = type_str[idx + 1..].strip_suffix(']').ok_or_else(malformed)?;
            let array = if inner.is_empty() {
                ArraySpec::Unbounded
            } else if let Some(bound) = inner.strip_prefix("<=") {
                ArraySpec::Bounded(parse_bound(bound, line, type_str)?)
            } else {
                ArraySpec::Fixed(parse_bound(inner, line, type_str)?)
            };
            (&type_str[..idx], array)
        }
        None => (type_str, ArraySpec::Single),
    };

    if base_str.is_empty() {
        return Err(malformed());
    }

    let base = if let Some((kind, bound)) = base_str.split_once("<=") {
        let bound = parse_bound(bound, line, type_str)?;
        match kind {
            "string" => BaseRef::BoundedString(bound),
            "wstring" => BaseRef::BoundedWString(bound),
            _ => return Err(malformed()),
        }
    } else if let Ok(primitive) = base_str.parse::<Primitive>() {
        BaseRef::Primitive(primitive)
    } else if base_str == "Header" {
        BaseRef::Named("std_msgs/msg/Header".to_string())
    } else if base_str.contains('/') || base_str.starts_with(|c: char| c.is_ascii_uppercase()) {
        BaseRef::Named(base_str.to_string())
    } else {
        return Err(SchemaError::UnknownPrimitive {
            line,
            name: base_str.to_string(),
        });
    };

    Ok(TypeRef { base, array })
}

/// Split a line after the type token into `(name, is_constant, value)`.
/// A name followed by `=` declares a constant.
fn split_name(rest: &str) -> (&str, bool, &str) {
    let rest = rest.trim_start();
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '=')
        .unwrap_or(rest.len());
    let (name, after) = rest.split_at(end);
    let after = after.trim_start();
    match after.strip_prefix('=') {
        Some(value) => (name, true, value.trim()),
        None => (name, false, after.trim()),
    }
}

/// Parse the text of a `.msg` file (or one half of a `.srv` file).
///
/// `type_name` is only used for error messages.
pub fn parse_definition(text: &str, type_name: &str) -> Result<ParsedDefinition> {
    let mut definition = ParsedDefinition::default();
    let mut seen = HashSet::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let content = strip_comment(raw).trim();
        if content.is_empty() {
            continue;
        }

        let malformed = || SchemaError::MalformedLine {
            line,
            text: content.to_string(),
        };

        let (type_str, rest) = content
            .split_once(char::is_whitespace)
            .ok_or_else(malformed)?;
        let (name, is_constant, value) = split_name(rest);
        if !is_field_name(name) {
            return Err(malformed());
        }

        if is_constant {
            if value.is_empty() {
                return Err(malformed());
            }
            // Constants must still name a valid type even though they are not encoded.
            parse_type_ref(type_str, line)?;
            definition.constants.push(Constant {
                const_type: type_str.to_string(),
                name: name.to_string(),
                value: value.to_string(),
            });
            continue;
        }

        let type_ref = parse_type_ref(type_str, line)?;
        if !seen.insert(name.to_string()) {
            return Err(SchemaError::DuplicateField {
                type_name: type_name.to_string(),
                field: name.to_string(),
            });
        }
        definition.fields.push(ParsedField {
            name: name.to_string(),
            type_ref,
            default_value: (!value.is_empty()).then(|| value.to_string()),
            line,
        });
    }

    Ok(definition)
}

/// Split `.srv` text into its request and response halves.
pub fn split_service(text: &str) -> Option<(String, String)> {
    let mut request = String::new();
    let mut response = String::new();
    let mut found = false;
    for line in text.lines() {
        if !found && strip_comment(line).trim() == "---" {
            found = true;
            continue;
        }
        let target = if found { &mut response } else { &mut request };
        target.push_str(line);
        target.push('\n');
    }
    found.then_some((request, response))
}
