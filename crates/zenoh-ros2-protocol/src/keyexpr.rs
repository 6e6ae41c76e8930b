//! rmw_zenoh compatible key expressions and liveliness tokens.
//!
//! Key expression formats:
//! - Topic: `<domain_id>/<topic>/<dds_type>/<hash>`
//! - Liveliness: `@ros2_lv/<domain_id>/<zid>/<nid>/<eid>/<kind>/<enclave>/<ns>/<name>[/<topic>/<dds_type>/<hash>/<qos>]`
//!
//! Topic keys keep their inner slashes. Liveliness tokens mangle every `/`
//! inside a name to `%` so each name occupies exactly one segment.

use sha2::{Digest, Sha256};
use tracing::debug;
use zenoh_ros2_schema::{TypeHash, TypeName};

use crate::entity::{EndpointIdentity, Entity, EntityKind, NodeIdentity};
use crate::error::{Result, TokenError};
use crate::qos::QosProfile;

/// Admin space prefix of every ROS 2 liveliness token.
pub const ADMIN_SPACE: &str = "@ros2_lv";
/// Placeholder for the root namespace and the (unsupported) enclave.
pub const EMPTY_PLACEHOLDER: &str = "%";

const NODE_SEGMENTS: usize = 9;
const ENDPOINT_SEGMENTS: usize = 13;

/// `pkg/msg/Name` -> `pkg::msg::dds_::Name_`.
pub fn dds_type_name(type_name: &TypeName) -> String {
    format!(
        "{}::{}::dds_::{}_",
        type_name.package(),
        type_name.kind(),
        type_name.name()
    )
}

/// Inverse of [`dds_type_name`].
pub fn ros_type_name(dds_name: &str) -> Option<TypeName> {
    let parts: Vec<&str> = dds_name.split("::").collect();
    let [package, kind, "dds_", name] = parts[..] else {
        return None;
    };
    let name = name.strip_suffix('_')?;
    TypeName::new(package, kind.parse().ok()?, name).ok()
}

pub fn mangle_name(name: &str) -> String {
    name.replace('/', "%")
}

pub fn demangle_name(name: &str) -> String {
    name.replace('%', "/")
}

fn is_name_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn invalid_name(name: &str, reason: &str) -> TokenError {
    TokenError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Validate and normalize a namespace: `""` and `"/"` become `/`, a missing
/// leading slash is added and a trailing one removed.
pub fn validate_namespace(namespace: &str) -> Result<String> {
    let trimmed = namespace.trim_end_matches('/');
    let body = trimmed.strip_prefix('/').unwrap_or(trimmed);
    if body.is_empty() {
        if namespace.is_empty() || namespace == "/" {
            return Ok("/".to_string());
        }
        return Err(invalid_name(namespace, "namespace has empty segments"));
    }
    if !body.split('/').all(is_name_token) {
        return Err(invalid_name(
            namespace,
            "namespace segments may only contain alphanumerics and '_'",
        ));
    }
    Ok(format!("/{body}"))
}

pub fn validate_node_name(name: &str) -> Result<()> {
    if is_name_token(name) {
        Ok(())
    } else {
        Err(invalid_name(
            name,
            "node names may only contain alphanumerics and '_'",
        ))
    }
}

/// Check that `topic` is fully qualified: `/seg[/seg...]`.
pub fn validate_topic(topic: &str) -> Result<()> {
    match topic.strip_prefix('/') {
        Some(body) if body.split('/').all(is_name_token) => Ok(()),
        _ => Err(invalid_name(
            topic,
            "expected a fully qualified name like '/ns/topic'",
        )),
    }
}

pub(crate) fn join_name(namespace: &str, name: &str) -> String {
    if namespace == "/" {
        format!("/{name}")
    } else {
        format!("{namespace}/{name}")
    }
}

/// Expand a topic or service name relative to a node.
///
/// Absolute names are kept, `~` expands to the node's own name and anything
/// else is placed under the node's namespace.
pub fn qualify_name(namespace: &str, node_name: &str, name: &str) -> Result<String> {
    let namespace = validate_namespace(namespace)?;
    let qualified = if name == "~" {
        join_name(&namespace, node_name)
    } else if let Some(rest) = name.strip_prefix("~/") {
        join_name(&join_name(&namespace, node_name), rest)
    } else if name.starts_with('/') {
        name.to_string()
    } else {
        join_name(&namespace, name)
    };
    let qualified = match qualified.strip_suffix('/') {
        Some(q) if !q.is_empty() => q.to_string(),
        _ => qualified,
    };
    validate_topic(&qualified)?;
    Ok(qualified)
}

/// Data-plane key expression of a topic or service.
pub fn topic_key_expr(domain_id: u32, topic: &str, dds_type: &str, type_hash: &TypeHash) -> String {
    let topic = topic.trim_matches('/');
    format!("{domain_id}/{topic}/{dds_type}/{type_hash}")
}

/// Key expression matching every token of a domain.
pub fn domain_liveliness_selector(domain_id: u32) -> String {
    format!("{ADMIN_SPACE}/{domain_id}/**")
}

fn check_node(node: &NodeIdentity) -> Result<()> {
    if !is_name_token(&node.session_id) {
        return Err(invalid_name(&node.session_id, "session id must be a single segment"));
    }
    if validate_namespace(&node.namespace)? != node.namespace {
        return Err(invalid_name(&node.namespace, "namespace is not normalized"));
    }
    validate_node_name(&node.name)
}

fn node_prefix(node: &NodeIdentity, entity_id: u32, kind: EntityKind) -> String {
    format!(
        "{ADMIN_SPACE}/{}/{}/{}/{entity_id}/{kind}/{EMPTY_PLACEHOLDER}/{}/{}",
        node.domain_id,
        node.session_id,
        node.node_id,
        mangle_name(&node.namespace),
        node.name,
    )
}

/// `@ros2_lv/<domain>/<zid>/<nid>/<nid>/NN/%/<ns>/<name>`
pub fn node_token(node: &NodeIdentity) -> Result<String> {
    check_node(node)?;
    Ok(node_prefix(node, node.node_id, EntityKind::Node))
}

/// `@ros2_lv/<domain>/<zid>/<nid>/<eid>/<kind>/%/<ns>/<name>/<topic>/<type>/<hash>/<qos>`
pub fn endpoint_token(endpoint: &EndpointIdentity) -> Result<String> {
    check_node(&endpoint.node)?;
    if endpoint.kind == EntityKind::Node {
        return Err(invalid_name("NN", "endpoint kind cannot be a node"));
    }
    validate_topic(&endpoint.topic)?;
    if endpoint.type_name.is_empty() || endpoint.type_name.contains(['/', '%']) {
        return Err(invalid_name(&endpoint.type_name, "invalid DDS type name"));
    }
    Ok(format!(
        "{}/{}/{}/{}/{}",
        node_prefix(&endpoint.node, endpoint.entity_id, endpoint.kind),
        mangle_name(&endpoint.topic),
        endpoint.type_name,
        endpoint.type_hash,
        endpoint.qos.encode(),
    ))
}

/// Parse a liveliness token back into the identity it was built from.
pub fn parse_liveliness(token: &str) -> Result<Entity> {
    parse_token(token).inspect_err(|e| debug!("rejected liveliness token: {e}"))
}

fn parse_token(token: &str) -> Result<Entity> {
    let malformed = |reason: String| TokenError::MalformedToken {
        token: token.to_string(),
        reason,
    };

    let segments: Vec<&str> = token.split('/').collect();
    let count = segments.len();
    if count != NODE_SEGMENTS && count != ENDPOINT_SEGMENTS {
        return Err(malformed(format!(
            "expected {NODE_SEGMENTS} or {ENDPOINT_SEGMENTS} segments, found {count}"
        )));
    }

    let mut iter = segments.into_iter();
    let mut next = |what: &str| iter.next().ok_or_else(|| malformed(format!("missing {what}")));

    if next("admin space")? != ADMIN_SPACE {
        return Err(malformed(format!("missing '{ADMIN_SPACE}' prefix")));
    }
    let domain_id = parse_number(next("domain id")?, "domain id").map_err(&malformed)?;
    let session_id = next("session id")?.to_string();
    if !is_name_token(&session_id) {
        return Err(malformed("empty or invalid session id".to_string()));
    }
    let node_id = parse_number(next("node id")?, "node id").map_err(&malformed)?;
    let entity_id = parse_number(next("entity id")?, "entity id").map_err(&malformed)?;
    let kind_code = next("entity kind")?;
    let kind: EntityKind = kind_code
        .parse()
        .map_err(|_| malformed(format!("unknown entity kind '{kind_code}'")))?;
    let enclave = next("enclave")?;
    if enclave != EMPTY_PLACEHOLDER {
        return Err(malformed(format!("unsupported enclave '{enclave}'")));
    }
    let namespace = demangle_name(next("namespace")?);
    let name = next("node name")?.to_string();

    let node = NodeIdentity {
        domain_id,
        session_id,
        node_id,
        namespace,
        name,
    };
    check_node(&node).map_err(|e| malformed(e.to_string()))?;

    if kind == EntityKind::Node {
        if count != NODE_SEGMENTS {
            return Err(malformed("node token carries endpoint segments".to_string()));
        }
        if node_id != entity_id {
            return Err(malformed("node id and entity id differ".to_string()));
        }
        return Ok(Entity::Node(node));
    }

    let topic = demangle_name(next("topic")?);
    validate_topic(&topic).map_err(|e| malformed(e.to_string()))?;
    let type_name = next("type name")?.to_string();
    let hash = next("type hash")?;
    let type_hash = TypeHash::from_rihs_string(hash).map_err(|e| malformed(e.to_string()))?;
    let qos = QosProfile::decode(next("qos")?)?;

    Ok(Entity::Endpoint(EndpointIdentity {
        node,
        entity_id,
        kind,
        topic,
        type_name,
        type_hash,
        qos,
    }))
}

/// Decimal id as the token writer formats it: digits only, no sign and no
/// leading zeros.
fn parse_number(field: &str, what: &str) -> std::result::Result<u32, String> {
    let canonical = !field.is_empty()
        && field.bytes().all(|b| b.is_ascii_digit())
        && (field == "0" || !field.starts_with('0'));
    if !canonical {
        return Err(format!("{what} '{field}' is not a number"));
    }
    field
        .parse()
        .map_err(|_| format!("{what} '{field}' is out of range"))
}

/// Entity GID: the first 16 bytes of the SHA-256 of its liveliness token.
pub fn gid(token: &str) -> [u8; 16] {
    let digest = Sha256::digest(token.as_bytes());
    let mut gid = [0u8; 16];
    gid.copy_from_slice(&digest[..16]);
    gid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qos::QosReliability;

    const STRING_HASH: &str =
        "RIHS01_df668c740482bbd48fb39d76a70dfd4bd59db1288021743503259e948f6b1a18";

    fn node(namespace: &str, name: &str) -> NodeIdentity {
        NodeIdentity {
            domain_id: 0,
            session_id: "1234567890abcdef1234567890abcdef".into(),
            node_id: 0,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    fn publisher(node: NodeIdentity, topic: &str) -> EndpointIdentity {
        EndpointIdentity {
            node,
            entity_id: 1,
            kind: EntityKind::Publisher,
            topic: topic.into(),
            type_name: "std_msgs::msg::dds_::String_".into(),
            type_hash: STRING_HASH.parse().unwrap(),
            qos: QosProfile::default(),
        }
    }

    #[test]
    fn test_mangle_demangle() {
        assert_eq!(mangle_name("/chatter"), "%chatter");
        assert_eq!(mangle_name("/"), "%");
        assert_eq!(mangle_name("/robot1/ns"), "%robot1%ns");
        assert_eq!(demangle_name("%robot1%ns"), "/robot1/ns");
        assert_eq!(demangle_name(EMPTY_PLACEHOLDER), "/");
    }

    #[test]
    fn test_dds_type_names() {
        let msg: TypeName = "std_msgs/msg/String".parse().unwrap();
        assert_eq!(dds_type_name(&msg), "std_msgs::msg::dds_::String_");
        let srv: TypeName = "example_interfaces/srv/AddTwoInts".parse().unwrap();
        assert_eq!(dds_type_name(&srv), "example_interfaces::srv::dds_::AddTwoInts_");
        assert_eq!(ros_type_name("example_interfaces::srv::dds_::AddTwoInts_"), Some(srv));
        assert_eq!(ros_type_name("std_msgs::msg::String_"), None);
        assert_eq!(ros_type_name("std_msgs::msg::dds_::String"), None);
    }

    #[test]
    fn test_namespace_validation() {
        assert_eq!(validate_namespace("").unwrap(), "/");
        assert_eq!(validate_namespace("/").unwrap(), "/");
        assert_eq!(validate_namespace("robot1").unwrap(), "/robot1");
        assert_eq!(validate_namespace("/robot1/arm/").unwrap(), "/robot1/arm");
        for bad in ["//", "/a//b", "/a%b", "/a b", "/ä"] {
            assert!(validate_namespace(bad).is_err(), "{bad:?}");
        }
        assert!(validate_node_name("talker_1").is_ok());
        assert!(validate_node_name("talker/1").is_err());
        assert!(validate_node_name("").is_err());
    }

    #[test]
    fn test_qualify_name() {
        assert_eq!(qualify_name("/", "talker", "chatter").unwrap(), "/chatter");
        assert_eq!(qualify_name("/ns", "talker", "chatter").unwrap(), "/ns/chatter");
        assert_eq!(qualify_name("/ns", "talker", "/chatter").unwrap(), "/chatter");
        assert_eq!(qualify_name("/ns", "talker", "~/status").unwrap(), "/ns/talker/status");
        assert_eq!(qualify_name("", "talker", "a/b/").unwrap(), "/a/b");
        assert!(qualify_name("/", "talker", "").is_err());
        assert!(qualify_name("/", "talker", "bad%name").is_err());
    }

    #[test]
    fn test_topic_key_expr() {
        let hash: TypeHash = STRING_HASH.parse().unwrap();
        assert_eq!(
            topic_key_expr(0, "/chatter", "std_msgs::msg::dds_::String_", &hash),
            format!("0/chatter/std_msgs::msg::dds_::String_/{STRING_HASH}")
        );
        assert_eq!(
            topic_key_expr(7, "/robot1/cmd_vel", "geometry_msgs::msg::dds_::Twist_", &hash),
            format!("7/robot1/cmd_vel/geometry_msgs::msg::dds_::Twist_/{STRING_HASH}")
        );
        assert_eq!(
            publisher(node("/", "talker"), "/chatter").topic_key_expr(),
            format!("0/chatter/std_msgs::msg::dds_::String_/{STRING_HASH}")
        );
    }

    #[test]
    fn test_node_token() {
        let token = node_token(&node("/", "talker")).unwrap();
        assert_eq!(
            token,
            "@ros2_lv/0/1234567890abcdef1234567890abcdef/0/0/NN/%/%/talker"
        );
        let token = node_token(&node("/robot1", "talker")).unwrap();
        assert!(token.ends_with("/NN/%/%robot1/talker"));
        assert!(node_token(&node("robot1", "talker")).is_err());
    }

    #[test]
    fn test_endpoint_token() {
        let token = endpoint_token(&publisher(node("/", "talker"), "/chatter")).unwrap();
        assert_eq!(
            token,
            format!(
                "@ros2_lv/0/1234567890abcdef1234567890abcdef/0/1/MP/%/%/talker/%chatter/std_msgs::msg::dds_::String_/{STRING_HASH}/::,10:,:,:,,"
            )
        );
    }

    #[test]
    fn test_token_roundtrip() {
        let mut endpoint = publisher(node("/robot1/arm", "driver"), "/robot1/arm/joint_states");
        endpoint.kind = EntityKind::Subscription;
        endpoint.entity_id = 42;
        endpoint.node.domain_id = 17;
        endpoint.qos = QosProfile::sensor_data();
        let entities = [
            Entity::Node(node("/", "talker")),
            Entity::Node(node("/robot1", "talker")),
            Entity::Endpoint(publisher(node("/", "talker"), "/chatter")),
            Entity::Endpoint(endpoint),
        ];
        for entity in entities {
            let token = entity.liveliness_token().unwrap();
            assert_eq!(parse_liveliness(&token).unwrap(), entity, "{token}");
        }
    }

    #[test]
    fn test_tokens_are_injective() {
        // Names that would collide if '/' inside a name were not mangled.
        let a = publisher(node("/a", "b"), "/c");
        let b = publisher(node("/", "a"), "/b/c");
        let mut c = publisher(node("/a", "b"), "/c");
        c.qos = c.qos.with_reliability(QosReliability::BestEffort);
        let tokens = [
            a.liveliness_token().unwrap(),
            b.liveliness_token().unwrap(),
            c.liveliness_token().unwrap(),
            node_token(&a.node).unwrap(),
            node_token(&b.node).unwrap(),
        ];
        for (i, x) in tokens.iter().enumerate() {
            for y in &tokens[i + 1..] {
                assert_ne!(x, y);
            }
        }
    }

    #[test]
    fn test_parse_rejects_malformed_tokens() {
        let good = endpoint_token(&publisher(node("/", "talker"), "/chatter")).unwrap();
        let bad_tokens = [
            "@ros2_lv/0/abc/0/0/NN/%/%".to_string(),
            "@ros2_lv/0/abc/0/0/NN/%/%/talker/extra".to_string(),
            "@other/0/abc/0/0/NN/%/%/talker".to_string(),
            "@ros2_lv/x/abc/0/0/NN/%/%/talker".to_string(),
            "@ros2_lv/+7/abc/0/0/NN/%/%/talker".to_string(),
            "@ros2_lv/0/abc/+0/+0/NN/%/%/talker".to_string(),
            "@ros2_lv/0/abc/00/00/NN/%/%/talker".to_string(),
            "@ros2_lv/4294967296/abc/0/0/NN/%/%/talker".to_string(),
            "@ros2_lv/0/abc/0/0/XX/%/%/talker".to_string(),
            "@ros2_lv/0/abc/0/1/NN/%/%/talker".to_string(),
            "@ros2_lv/0/abc/0/0/NN/enclave/%/talker".to_string(),
            good.replace("/MP/", "/NN/"),
            good.replace(STRING_HASH, "RIHS01_00"),
        ];
        for bad in &bad_tokens {
            assert!(
                matches!(parse_liveliness(bad), Err(TokenError::MalformedToken { .. })),
                "{bad} should be rejected"
            );
        }
        let bad_qos = good.replace("::,10:,:,:,,", "::,10:,:,:,");
        assert!(matches!(parse_liveliness(&bad_qos), Err(TokenError::Qos(_))));
    }

    #[test]
    fn test_gid() {
        let token = node_token(&node("/", "talker")).unwrap();
        assert_eq!(gid(&token), gid(&token));
        assert_ne!(gid(&token), gid(&node_token(&node("/", "listener")).unwrap()));
        assert_ne!(gid(&token), [0u8; 16]);
    }
}
