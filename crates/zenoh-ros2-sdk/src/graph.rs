//! Live view of the ROS graph, built from liveliness tokens.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};
use zenoh_ros2_protocol::{
    domain_liveliness_selector, parse_liveliness, EndpointIdentity, Entity, EntityKind,
    NodeIdentity,
};

use crate::error::Result;
use crate::transport::{LivelinessEvent, Transport, Undeclare};

#[derive(Default)]
pub struct GraphData {
    entities: HashMap<String, Entity>,
}

impl GraphData {
    fn apply(&mut self, event: LivelinessEvent) -> bool {
        match event {
            LivelinessEvent::Put(token) => {
                if self.entities.contains_key(&token) {
                    return false;
                }
                match parse_liveliness(&token) {
                    Ok(entity) => {
                        debug!("[GRF] Entity appeared: {token}");
                        self.entities.insert(token, entity);
                        true
                    }
                    Err(e) => {
                        warn!("[GRF] Ignoring liveliness token: {e}");
                        false
                    }
                }
            }
            LivelinessEvent::Delete(token) => {
                let removed = self.entities.remove(&token).is_some();
                debug!("[GRF] Entity disappeared: {token}, known={removed}");
                removed
            }
        }
    }

    fn endpoints(&self) -> impl Iterator<Item = &EndpointIdentity> {
        self.entities.values().filter_map(|entity| match entity {
            Entity::Endpoint(e) => Some(e),
            Entity::Node(_) => None,
        })
    }

    fn endpoints_of<'a>(
        &'a self,
        kind: EntityKind,
        topic: &'a str,
    ) -> impl Iterator<Item = &'a EndpointIdentity> {
        self.endpoints()
            .filter(move |e| e.kind == kind && e.topic == topic)
    }

    pub fn count_publishers(&self, topic: &str) -> usize {
        self.endpoints_of(EntityKind::Publisher, topic).count()
    }

    pub fn count_subscribers(&self, topic: &str) -> usize {
        self.endpoints_of(EntityKind::Subscription, topic).count()
    }

    pub fn has_node(&self, namespace: &str, name: &str) -> bool {
        self.entities.values().any(|entity| {
            matches!(entity, Entity::Node(n) if n.namespace == namespace && n.name == name)
        })
    }

    fn names_and_types(&self, services: bool) -> Vec<(String, Vec<String>)> {
        let mut names: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
        for endpoint in self.endpoints().filter(|e| e.kind.is_service() == services) {
            let type_name = endpoint
                .ros_type_name()
                .map(|t| t.to_string())
                .unwrap_or_else(|| endpoint.type_name.clone());
            names.entry(endpoint.topic.as_str()).or_default().insert(type_name);
        }
        names
            .into_iter()
            .map(|(name, types)| (name.to_string(), types.into_iter().collect()))
            .collect()
    }
}

struct Shared {
    data: Mutex<GraphData>,
    changed: Condvar,
}

/// Entities currently alive on one domain, this session's included.
pub struct Graph {
    domain_id: u32,
    shared: Arc<Shared>,
    subscriber: Mutex<Option<Box<dyn Undeclare>>>,
}

impl Graph {
    pub fn new(transport: Arc<dyn Transport>, domain_id: u32) -> Result<Self> {
        let shared = Arc::new(Shared {
            data: Mutex::new(GraphData::default()),
            changed: Condvar::new(),
        });
        let selector = domain_liveliness_selector(domain_id);
        debug!("[GRF] Watching {selector}");

        let c_shared = shared.clone();
        let subscriber = transport.declare_liveliness_subscriber(
            &selector,
            true,
            Arc::new(move |event| {
                let changed = c_shared.data.lock().apply(event);
                if changed {
                    c_shared.changed.notify_all();
                }
            }),
        )?;

        Ok(Self {
            domain_id,
            shared,
            subscriber: Mutex::new(Some(subscriber)),
        })
    }

    pub fn domain_id(&self) -> u32 {
        self.domain_id
    }

    /// Stop tracking. Later queries see the last known state.
    pub fn close(&self) {
        let Some(subscriber) = self.subscriber.lock().take() else {
            return;
        };
        if let Err(e) = subscriber.undeclare() {
            warn!("[GRF] Failed to undeclare liveliness subscriber: {e}");
        }
    }

    pub fn entities(&self) -> Vec<Entity> {
        self.shared.data.lock().entities.values().cloned().collect()
    }

    pub fn nodes(&self) -> Vec<NodeIdentity> {
        let data = self.shared.data.lock();
        let mut nodes: Vec<NodeIdentity> = data
            .entities
            .values()
            .filter_map(|entity| match entity {
                Entity::Node(n) => Some(n.clone()),
                Entity::Endpoint(_) => None,
            })
            .collect();
        nodes.sort_by(|a, b| {
            (a.fully_qualified_name(), &a.session_id, a.node_id)
                .cmp(&(b.fully_qualified_name(), &b.session_id, b.node_id))
        });
        nodes
    }

    /// `(namespace, name)` of every node, sorted.
    pub fn node_names(&self) -> Vec<(String, String)> {
        let names: BTreeSet<(String, String)> = self
            .nodes()
            .into_iter()
            .map(|n| (n.namespace, n.name))
            .collect();
        names.into_iter().collect()
    }

    pub fn publishers(&self, topic: &str) -> Vec<EndpointIdentity> {
        self.endpoints(EntityKind::Publisher, topic)
    }

    pub fn subscriptions(&self, topic: &str) -> Vec<EndpointIdentity> {
        self.endpoints(EntityKind::Subscription, topic)
    }

    pub fn services(&self, service: &str) -> Vec<EndpointIdentity> {
        self.endpoints(EntityKind::Service, service)
    }

    pub fn clients(&self, service: &str) -> Vec<EndpointIdentity> {
        self.endpoints(EntityKind::Client, service)
    }

    pub fn count_publishers(&self, topic: &str) -> usize {
        self.count(EntityKind::Publisher, topic)
    }

    pub fn count_subscribers(&self, topic: &str) -> usize {
        self.count(EntityKind::Subscription, topic)
    }

    /// Topic names with the ROS types advertised on them.
    pub fn topic_names_and_types(&self) -> Vec<(String, Vec<String>)> {
        self.shared.data.lock().names_and_types(false)
    }

    pub fn service_names_and_types(&self) -> Vec<(String, Vec<String>)> {
        self.shared.data.lock().names_and_types(true)
    }

    /// Endpoints declared by the node `name` in `namespace`.
    pub fn endpoints_of_node(&self, namespace: &str, name: &str) -> Vec<EndpointIdentity> {
        self.shared
            .data
            .lock()
            .endpoints()
            .filter(|e| e.node.namespace == namespace && e.node.name == name)
            .cloned()
            .collect()
    }

    /// Block until a server for `service` is alive or `timeout` elapses.
    pub fn wait_for_service(&self, service: &str, timeout: Duration) -> bool {
        self.wait_until(timeout, |data| {
            data.endpoints_of(EntityKind::Service, service).next().is_some()
        })
    }

    /// Block until `condition` holds on the graph or `timeout` elapses.
    pub fn wait_until<F>(&self, timeout: Duration, condition: F) -> bool
    where
        F: Fn(&GraphData) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut data = self.shared.data.lock();
        while !condition(&data) {
            if self.shared.changed.wait_until(&mut data, deadline).timed_out() {
                return condition(&data);
            }
        }
        true
    }

    fn endpoints(&self, kind: EntityKind, topic: &str) -> Vec<EndpointIdentity> {
        self.shared
            .data
            .lock()
            .endpoints_of(kind, topic)
            .cloned()
            .collect()
    }

    fn count(&self, kind: EntityKind, topic: &str) -> usize {
        self.shared.data.lock().endpoints_of(kind, topic).count()
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use zenoh_ros2_protocol::QosProfile;
    use zenoh_ros2_schema::TypeHash;

    use super::*;
    use crate::transport::MemoryTransport;

    fn node(session_id: &str, node_id: u32, name: &str) -> NodeIdentity {
        NodeIdentity {
            domain_id: 0,
            session_id: session_id.to_string(),
            node_id,
            namespace: "/".to_string(),
            name: name.to_string(),
        }
    }

    fn publisher(node: NodeIdentity, entity_id: u32, topic: &str) -> EndpointIdentity {
        EndpointIdentity {
            node,
            entity_id,
            kind: EntityKind::Publisher,
            topic: topic.to_string(),
            type_name: "std_msgs::msg::dds_::String_".to_string(),
            type_hash: TypeHash::zero(),
            qos: QosProfile::default(),
        }
    }

    #[test]
    fn test_tracks_tokens() {
        let transport = Arc::new(MemoryTransport::new());
        let talker = node("aa", 0, "talker");
        let _existing = transport.declare_token(&talker.liveliness_token().unwrap()).unwrap();

        let graph = Graph::new(transport.clone(), 0).unwrap();
        assert_eq!(graph.node_names(), vec![("/".to_string(), "talker".to_string())]);

        let endpoint = publisher(talker, 1, "/chatter");
        let token = transport.declare_token(&endpoint.liveliness_token().unwrap()).unwrap();
        assert_eq!(graph.count_publishers("/chatter"), 1);
        assert_eq!(graph.publishers("/chatter")[0], endpoint);
        assert_eq!(
            graph.topic_names_and_types(),
            vec![("/chatter".to_string(), vec!["std_msgs/msg/String".to_string()])]
        );
        assert!(graph.service_names_and_types().is_empty());

        token.undeclare().unwrap();
        assert_eq!(graph.count_publishers("/chatter"), 0);
    }

    #[test]
    fn test_ignores_malformed_and_foreign_tokens() {
        let transport = Arc::new(MemoryTransport::new());
        let graph = Graph::new(transport.clone(), 0).unwrap();
        let _bad = transport.declare_token("@ros2_lv/0/aa/garbage").unwrap();
        let far = NodeIdentity {
            domain_id: 5,
            ..node("bb", 0, "far")
        };
        let _other_domain = transport.declare_token(&far.liveliness_token().unwrap()).unwrap();
        assert!(graph.entities().is_empty());
    }

    #[test]
    fn test_wait_until_times_out() {
        let transport = Arc::new(MemoryTransport::new());
        let graph = Graph::new(transport, 0).unwrap();
        assert!(!graph.wait_for_service("/add_two_ints", Duration::from_millis(20)));
        assert!(graph.wait_until(Duration::ZERO, |data| !data.has_node("/", "nobody")));
    }

    #[test]
    fn test_close_freezes_view() {
        let transport = Arc::new(MemoryTransport::new());
        let graph = Graph::new(transport.clone(), 0).unwrap();
        graph.close();
        graph.close();
        let _token = transport.declare_token(&node("aa", 0, "late").liveliness_token().unwrap()).unwrap();
        assert!(graph.nodes().is_empty());
    }
}
