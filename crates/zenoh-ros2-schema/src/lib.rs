//! ROS 2 interface definitions and type hashing.
//!
//! This crate turns `.msg`/`.srv` text into resolved descriptors and computes
//! their RIHS01 hashes, which ROS 2 peers embed in every key expression and
//! liveliness token. It is used for:
//! - Parsing definitions and resolving nested types
//! - RIHS01 hash computation for messages and services
//! - Type descriptors consumed by the CDR codec

mod cache;
mod descriptor;
mod error;
mod hash;
mod parser;
mod registry;
mod resolver;
mod type_description;
mod type_id;
mod type_name;

use std::fmt;
use std::str::FromStr;

pub use cache::TypeHashCache;
pub use descriptor::{
    ElementType, FieldDescriptor, FieldKind, ServiceDescriptor, TypeDescriptor, EMPTY_STRUCT_MEMBER,
};
pub use error::{Result, SchemaError};
pub use hash::{calculate_hash, message_type_hash, service_type_hash, to_ros2_json};
pub use parser::{parse_definition, split_service, Constant, ParsedDefinition, Primitive};
pub use registry::TypeRegistry;
pub use resolver::{DirectoryResolver, StaticResolver, TypeResolver};
pub use type_description::{
    FieldDescription, FieldTypeDescription, TypeDescription, TypeDescriptionMsg,
};
pub use type_id::TypeId;
pub use type_name::{InterfaceKind, TypeName};

const RIHS01_PREFIX: &str = "RIHS01_";

/// RIHS01 type hash (32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TypeHash(pub [u8; 32]);

impl TypeHash {
    /// `RIHS01_` followed by 64 lowercase hex characters.
    pub fn to_rihs_string(&self) -> String {
        format!("{RIHS01_PREFIX}{}", hex::encode(self.0))
    }

    pub fn from_rihs_string(s: &str) -> Result<Self> {
        let invalid = || SchemaError::InvalidHash(s.to_string());
        let hex_part = s.strip_prefix(RIHS01_PREFIX).ok_or_else(invalid)?;
        // Lowercase only, as written by `to_rihs_string`.
        if hex_part.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(invalid());
        }
        let mut hash = [0u8; 32];
        hex::decode_to_slice(hex_part, &mut hash).map_err(|_| invalid())?;
        Ok(TypeHash(hash))
    }

    /// All-zero hash, advertised by peers that do not compute type hashes.
    pub fn zero() -> Self {
        TypeHash([0u8; 32])
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rihs_string())
    }
}

impl FromStr for TypeHash {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_rihs_string(s)
    }
}
