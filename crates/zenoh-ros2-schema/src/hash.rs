//! RIHS01 type hash calculation.
//!
//! RIHS01 is the SHA-256 of the type description serialized the way Python's
//! `json.dumps()` does it by default: `", "` between items and `": "` after keys.

use std::io;

use serde::Serialize;
use serde_json::ser::Formatter;
use sha2::{Digest, Sha256};

use crate::descriptor::{ServiceDescriptor, TypeDescriptor};
use crate::error::Result;
use crate::type_description::TypeDescriptionMsg;
use crate::TypeHash;

/// serde_json formatter reproducing Python's default separators.
struct PythonFormatter;

impl Formatter for PythonFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

/// Serialize `value` to ROS 2 hashing JSON, e.g. `{"a": 1, "b": [1, 2]}`.
pub fn to_ros2_json<T: Serialize>(value: &T) -> Result<String> {
    let mut out = Vec::with_capacity(256);
    let mut ser = serde_json::Serializer::with_formatter(&mut out, PythonFormatter);
    value.serialize(&mut ser)?;
    // serde_json only ever emits UTF-8
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// RIHS01 hash of a type description.
pub fn calculate_hash(msg: &TypeDescriptionMsg) -> Result<TypeHash> {
    let json = to_ros2_json(msg)?;
    Ok(TypeHash(Sha256::digest(json.as_bytes()).into()))
}

pub fn message_type_hash(desc: &TypeDescriptor) -> Result<TypeHash> {
    calculate_hash(&TypeDescriptionMsg::from(desc))
}

pub fn service_type_hash(srv: &ServiceDescriptor) -> Result<TypeHash> {
    calculate_hash(&TypeDescriptionMsg::from(srv))
}
