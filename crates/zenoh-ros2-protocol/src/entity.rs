//! Identity of ROS 2 entities as advertised through liveliness tokens.

use zenoh_ros2_schema::{TypeHash, TypeName};

use crate::error::Result;
use crate::keyexpr;
use crate::qos::QosProfile;

/// ROS 2 entity kind, written as its two-letter token code.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
pub enum EntityKind {
    #[default]
    #[strum(serialize = "NN")]
    Node,
    #[strum(serialize = "MP")]
    Publisher,
    #[strum(serialize = "MS")]
    Subscription,
    #[strum(serialize = "SS")]
    Service,
    #[strum(serialize = "SC")]
    Client,
}

impl EntityKind {
    pub fn is_service(&self) -> bool {
        matches!(self, EntityKind::Service | EntityKind::Client)
    }
}

/// A node as seen on the graph.
///
/// `namespace` is normalized (`/` for the root, otherwise `/a/b`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeIdentity {
    pub domain_id: u32,
    /// Zenoh session id of the owning process, in hex.
    pub session_id: String,
    pub node_id: u32,
    pub namespace: String,
    pub name: String,
}

impl NodeIdentity {
    /// Fully qualified node name, e.g. `/ns/talker`.
    pub fn fully_qualified_name(&self) -> String {
        keyexpr::join_name(&self.namespace, &self.name)
    }

    pub fn liveliness_token(&self) -> Result<String> {
        keyexpr::node_token(self)
    }
}

/// A publisher, subscription, service server or client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointIdentity {
    pub node: NodeIdentity,
    pub entity_id: u32,
    pub kind: EntityKind,
    /// Fully qualified topic or service name, with a leading `/`.
    pub topic: String,
    /// DDS-style type name, e.g. `std_msgs::msg::dds_::String_`.
    pub type_name: String,
    pub type_hash: TypeHash,
    pub qos: QosProfile,
}

impl EndpointIdentity {
    /// The ROS type name this endpoint carries, if its DDS name is well formed.
    pub fn ros_type_name(&self) -> Option<TypeName> {
        keyexpr::ros_type_name(&self.type_name)
    }

    pub fn liveliness_token(&self) -> Result<String> {
        keyexpr::endpoint_token(self)
    }

    pub fn topic_key_expr(&self) -> String {
        keyexpr::topic_key_expr(self.node.domain_id, &self.topic, &self.type_name, &self.type_hash)
    }
}

/// Parsed liveliness token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Entity {
    Node(NodeIdentity),
    Endpoint(EndpointIdentity),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Node(_) => EntityKind::Node,
            Entity::Endpoint(e) => e.kind,
        }
    }

    pub fn node(&self) -> &NodeIdentity {
        match self {
            Entity::Node(n) => n,
            Entity::Endpoint(e) => &e.node,
        }
    }

    pub fn liveliness_token(&self) -> Result<String> {
        match self {
            Entity::Node(n) => n.liveliness_token(),
            Entity::Endpoint(e) => e.liveliness_token(),
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_kind_codes() {
        let codes: Vec<&str> = EntityKind::iter().map(<&str>::from).collect();
        assert_eq!(codes, ["NN", "MP", "MS", "SS", "SC"]);
        for kind in EntityKind::iter() {
            assert_eq!(kind.to_string().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("XX".parse::<EntityKind>().is_err());
        assert!(EntityKind::Client.is_service());
        assert!(!EntityKind::Publisher.is_service());
    }

    #[test]
    fn test_fully_qualified_node_name() {
        let mut node = NodeIdentity {
            domain_id: 0,
            session_id: "abc".into(),
            node_id: 0,
            namespace: "/".into(),
            name: "talker".into(),
        };
        assert_eq!(node.fully_qualified_name(), "/talker");
        node.namespace = "/robot1".into();
        assert_eq!(node.fully_qualified_name(), "/robot1/talker");
    }
}
