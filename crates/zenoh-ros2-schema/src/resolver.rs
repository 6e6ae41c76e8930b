//! Sources of interface definition text.
//!
//! Parsing never performs I/O itself: nested names are handed to a
//! [`TypeResolver`], which returns the raw `.msg`/`.srv` text.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::type_name::{InterfaceKind, TypeName};

/// Maps a fully qualified type name to its definition text.
pub trait TypeResolver: Send + Sync {
    fn resolve(&self, type_name: &TypeName) -> Option<String>;
}

impl<F> TypeResolver for F
where
    F: Fn(&TypeName) -> Option<String> + Send + Sync,
{
    fn resolve(&self, type_name: &TypeName) -> Option<String> {
        self(type_name)
    }
}

const BUILTIN_DEFINITIONS: &[(&str, &str)] = &[
    ("std_msgs/msg/String", "string data\n"),
    ("std_msgs/msg/Bool", "bool data\n"),
    ("std_msgs/msg/Empty", ""),
    (
        "std_msgs/msg/Header",
        "builtin_interfaces/Time stamp\nstring frame_id\n",
    ),
    ("builtin_interfaces/msg/Time", "int32 sec\nuint32 nanosec\n"),
    ("builtin_interfaces/msg/Duration", "int32 sec\nuint32 nanosec\n"),
    (
        "service_msgs/msg/ServiceEventInfo",
        "uint8 REQUEST_SENT = 0\n\
         uint8 REQUEST_RECEIVED = 1\n\
         uint8 RESPONSE_SENT = 2\n\
         uint8 RESPONSE_RECEIVED = 3\n\
         uint8 event_type\n\
         builtin_interfaces/Time stamp\n\
         char[16] client_gid\n\
         int64 sequence_number\n",
    ),
    ("geometry_msgs/msg/Vector3", "float64 x\nfloat64 y\nfloat64 z\n"),
    ("geometry_msgs/msg/Twist", "Vector3 linear\nVector3 angular\n"),
    (
        "example_interfaces/srv/AddTwoInts",
        "int64 a\nint64 b\n---\nint64 sum\n",
    ),
    ("std_srvs/srv/Empty", "---\n"),
    (
        "std_srvs/srv/Trigger",
        "---\nbool success\nstring message\n",
    ),
];

/// In-memory definitions, optionally falling back to another resolver.
#[derive(Clone, Default)]
pub struct StaticResolver {
    definitions: HashMap<String, String>,
    fallback: Option<Arc<dyn TypeResolver>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Definitions of the interfaces every ROS 2 installation ships
    /// (`std_msgs/String`, `builtin_interfaces/Time`, `service_msgs/ServiceEventInfo`, ...).
    pub fn builtin() -> Self {
        let mut resolver = Self::new();
        for (name, text) in BUILTIN_DEFINITIONS {
            resolver
                .definitions
                .insert((*name).to_string(), (*text).to_string());
        }
        resolver
    }

    /// Add or replace the definition of `type_name` (`pkg/msg/Name` or `pkg/srv/Name`).
    pub fn with_definition(mut self, type_name: &str, text: &str) -> Self {
        self.insert(type_name, text);
        self
    }

    pub fn insert(&mut self, type_name: &str, text: &str) {
        let key = type_name
            .parse::<TypeName>()
            .map(|n| n.to_string())
            .unwrap_or_else(|_| type_name.to_string());
        self.definitions.insert(key, text.to_string());
    }

    pub fn with_fallback<R: TypeResolver + 'static>(mut self, fallback: R) -> Self {
        self.fallback = Some(Arc::new(fallback));
        self
    }
}

impl TypeResolver for StaticResolver {
    fn resolve(&self, type_name: &TypeName) -> Option<String> {
        self.definitions
            .get(&type_name.to_string())
            .cloned()
            .or_else(|| self.fallback.as_ref()?.resolve(type_name))
    }
}

/// Reads definitions from a local checkout laid out as
/// `<root>/<package>/<msg|srv>/<Name>.<msg|srv>`.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    roots: Vec<PathBuf>,
}

impl DirectoryResolver {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            roots: vec![root.into()],
        }
    }

    /// Add another search root, tried after the existing ones.
    pub fn with_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.roots.push(root.into());
        self
    }

    fn relative_path(type_name: &TypeName) -> PathBuf {
        let ext = match type_name.kind() {
            InterfaceKind::Msg => "msg",
            InterfaceKind::Srv => "srv",
        };
        PathBuf::from(type_name.package())
            .join(ext)
            .join(format!("{}.{ext}", type_name.name()))
    }
}

impl TypeResolver for DirectoryResolver {
    fn resolve(&self, type_name: &TypeName) -> Option<String> {
        let relative = Self::relative_path(type_name);
        self.roots.iter().find_map(|root| {
            let path = root.join(&relative);
            match std::fs::read_to_string(&path) {
                Ok(text) => Some(text),
                Err(e) => {
                    debug!("{} not readable: {}", path.display(), e);
                    None
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> TypeName {
        s.parse().unwrap()
    }

    #[test]
    fn builtin_definitions_resolve() {
        let resolver = StaticResolver::builtin();
        assert_eq!(
            resolver.resolve(&name("std_msgs/msg/String")).as_deref(),
            Some("string data\n")
        );
        assert!(resolver.resolve(&name("nope/msg/Nope")).is_none());
    }

    #[test]
    fn short_names_are_normalized() {
        let resolver = StaticResolver::new().with_definition("my_pkg/Thing", "int32 x");
        assert!(resolver.resolve(&name("my_pkg/msg/Thing")).is_some());
    }

    #[test]
    fn fallback_and_closures() {
        let resolver = StaticResolver::new().with_fallback(|n: &TypeName| {
            (n.package() == "dyn_pkg").then(|| format!("string {}", n.name().to_lowercase()))
        });
        assert_eq!(
            resolver.resolve(&name("dyn_pkg/msg/Label")).as_deref(),
            Some("string label")
        );
        assert!(resolver.resolve(&name("other/msg/Label")).is_none());
    }

    #[test]
    fn directory_resolver_reads_interface_files() {
        let dir = tempfile::tempdir().unwrap();
        let msg_dir = dir.path().join("custom_msgs").join("msg");
        let srv_dir = dir.path().join("custom_msgs").join("srv");
        std::fs::create_dir_all(&msg_dir).unwrap();
        std::fs::create_dir_all(&srv_dir).unwrap();
        std::fs::write(msg_dir.join("Point2.msg"), "float32 x\nfloat32 y\n").unwrap();
        std::fs::write(srv_dir.join("Reset.srv"), "---\nbool ok\n").unwrap();

        let resolver = DirectoryResolver::new("/nonexistent").with_root(dir.path());
        assert_eq!(
            resolver.resolve(&name("custom_msgs/msg/Point2")).as_deref(),
            Some("float32 x\nfloat32 y\n")
        );
        assert_eq!(
            resolver.resolve(&name("custom_msgs/srv/Reset")).as_deref(),
            Some("---\nbool ok\n")
        );
        assert!(resolver.resolve(&name("custom_msgs/msg/Missing")).is_none());
    }
}
