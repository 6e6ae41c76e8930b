//! Wire-level naming for ROS 2 over Zenoh.
//!
//! Builds and parses the strings rmw_zenoh peers use to find each other:
//! - Data-plane key expressions for topics and services
//! - Liveliness tokens advertising nodes and endpoints
//! - The compact QoS string embedded in endpoint tokens

pub mod entity;
pub mod error;
pub mod keyexpr;
pub mod qos;

pub use entity::{EndpointIdentity, Entity, EntityKind, NodeIdentity};
pub use error::{QosError, Result, TokenError};
pub use keyexpr::{
    dds_type_name, demangle_name, domain_liveliness_selector, endpoint_token, gid, mangle_name,
    node_token, parse_liveliness, qualify_name, ros_type_name, topic_key_expr, validate_namespace,
    validate_node_name, validate_topic, ADMIN_SPACE,
};
pub use qos::{
    QosDuration, QosDurability, QosHistory, QosLiveliness, QosLivelinessKind, QosProfile,
    QosReliability,
};
