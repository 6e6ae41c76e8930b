//! Fully qualified ROS 2 interface names.

use std::fmt;
use std::str::FromStr;

use crate::error::SchemaError;

/// Interface namespace of a type (`msg` or `srv`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, strum::EnumString,
)]
pub enum InterfaceKind {
    #[strum(serialize = "msg")]
    Msg,
    #[strum(serialize = "srv")]
    Srv,
}

/// A fully qualified type name such as `std_msgs/msg/String`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName {
    package: String,
    kind: InterfaceKind,
    name: String,
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !s.starts_with(|c: char| c.is_ascii_digit())
}

impl TypeName {
    pub fn new(package: &str, kind: InterfaceKind, name: &str) -> Result<Self, SchemaError> {
        if !is_identifier(package) || !is_identifier(name) {
            return Err(SchemaError::InvalidTypeName(format!("{package}/{kind}/{name}")));
        }
        Ok(Self {
            package: package.to_string(),
            kind,
            name: name.to_string(),
        })
    }

    pub fn msg(package: &str, name: &str) -> Result<Self, SchemaError> {
        Self::new(package, InterfaceKind::Msg, name)
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn kind(&self) -> InterfaceKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Same type with a suffixed short name, e.g. `AddTwoInts` -> `AddTwoInts_Request`.
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self {
            package: self.package.clone(),
            kind: self.kind,
            name: format!("{}{}", self.name, suffix),
        }
    }

    /// Resolve a field type reference as written inside a definition of `self`'s package.
    ///
    /// Accepts `Type`, `pkg/Type` and `pkg/msg/Type`.
    pub fn resolve_reference(&self, reference: &str) -> Result<Self, SchemaError> {
        match reference.split('/').collect::<Vec<_>>().as_slice() {
            [name] => Self::msg(&self.package, name),
            [package, name] => Self::msg(package, name),
            [_, "msg", _] => reference.parse(),
            _ => Err(SchemaError::InvalidTypeName(reference.to_string())),
        }
    }
}

impl FromStr for TypeName {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SchemaError::InvalidTypeName(s.to_string());
        match s.split('/').collect::<Vec<_>>().as_slice() {
            [package, kind, name] => {
                let kind = kind.parse::<InterfaceKind>().map_err(|_| invalid())?;
                Self::new(package, kind, name).map_err(|_| invalid())
            }
            [package, name] => Self::msg(package, name).map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.package, self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_and_short_forms() {
        let full: TypeName = "std_msgs/msg/String".parse().unwrap();
        let short: TypeName = "std_msgs/String".parse().unwrap();
        assert_eq!(full, short);
        assert_eq!(full.to_string(), "std_msgs/msg/String");

        let srv: TypeName = "example_interfaces/srv/AddTwoInts".parse().unwrap();
        assert_eq!(srv.kind(), InterfaceKind::Srv);
        assert_eq!(
            srv.with_suffix("_Request").to_string(),
            "example_interfaces/srv/AddTwoInts_Request"
        );
    }

    #[test]
    fn rejects_malformed_names() {
        for bad in ["", "String", "a/b/c/d", "pkg/action/Fib", "pkg/msg/", "p-kg/msg/X"] {
            assert!(bad.parse::<TypeName>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn resolves_references_relative_to_package() {
        let owner: TypeName = "geometry_msgs/msg/Twist".parse().unwrap();
        assert_eq!(
            owner.resolve_reference("Vector3").unwrap().to_string(),
            "geometry_msgs/msg/Vector3"
        );
        assert_eq!(
            owner.resolve_reference("std_msgs/Header").unwrap().to_string(),
            "std_msgs/msg/Header"
        );
        assert_eq!(
            owner
                .resolve_reference("builtin_interfaces/msg/Time")
                .unwrap()
                .to_string(),
            "builtin_interfaces/msg/Time"
        );
    }
}
