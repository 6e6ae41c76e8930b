use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use zenoh_ros2_protocol::{
    dds_type_name, qualify_name, validate_namespace, validate_node_name, EndpointIdentity,
    EntityKind, NodeIdentity, QosProfile,
};
use zenoh_ros2_schema::{
    InterfaceKind, SchemaError, ServiceDescriptor, TypeDescriptor, TypeHash, TypeName,
};

use crate::context::ZContext;
use crate::error::{Error, Result};
use crate::pubsub::{ZPubBuilder, ZSubBuilder};
use crate::service::{ZClientBuilder, ZServerBuilder};
use crate::transport::Undeclare;
use crate::Builder;

pub struct ZNodeBuilder {
    ctx: ZContext,
    name: String,
    namespace: String,
}

impl ZNodeBuilder {
    pub(crate) fn new(ctx: ZContext, name: &str) -> Self {
        Self {
            ctx,
            name: name.to_string(),
            namespace: "/".to_string(),
        }
    }

    /// Namespace of the node. `""`, `"/"` and `"ns/"` style inputs are normalized.
    pub fn with_namespace<S: AsRef<str>>(mut self, namespace: S) -> Self {
        self.namespace = namespace.as_ref().to_string();
        self
    }
}

impl Builder for ZNodeBuilder {
    type Output = ZNode;

    #[tracing::instrument(name = "node_build", skip(self), fields(
        name = %self.name,
        namespace = %self.namespace,
        id = tracing::field::Empty
    ))]
    fn build(self) -> Result<ZNode> {
        if self.ctx.is_closed() {
            return Err(Error::Closed("context"));
        }
        validate_node_name(&self.name)?;
        let namespace = validate_namespace(&self.namespace)?;
        let id = self.ctx.next_id();
        tracing::Span::current().record("id", id);

        debug!("[NOD] Creating node: {}/{}, id={}", namespace, self.name, id);
        let identity = NodeIdentity {
            domain_id: self.ctx.domain_id(),
            session_id: self.ctx.session_id(),
            node_id: id,
            namespace,
            name: self.name,
        };
        let token_ke = identity.liveliness_token()?;
        debug!("[NOD] Liveliness token KE: {}", token_ke);
        let token = self.ctx.transport().declare_token(&token_ke)?;

        debug!("[NOD] Node ready: {}", identity.fully_qualified_name());
        Ok(ZNode {
            inner: Arc::new(NodeInner {
                ctx: self.ctx,
                identity,
                token: Mutex::new(Some(token)),
            }),
        })
    }
}

struct NodeInner {
    ctx: ZContext,
    identity: NodeIdentity,
    token: Mutex<Option<Box<dyn Undeclare>>>,
}

impl NodeInner {
    fn close(&self) {
        let Some(token) = self.token.lock().take() else {
            return;
        };
        debug!("[NOD] Closing node {}", self.identity.fully_qualified_name());
        if let Err(e) = token.undeclare() {
            warn!("[NOD] Failed to undeclare node token: {e}");
        }
    }
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        self.close();
    }
}

/// A named participant owning publishers, subscribers, services and clients.
///
/// Entities keep their node alive, so the node token stays declared until the
/// node and everything created from it are gone, or [`ZNode::close`] is called.
#[derive(Clone)]
pub struct ZNode {
    inner: Arc<NodeInner>,
}

impl std::fmt::Debug for ZNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZNode")
            .field("identity", &self.inner.identity)
            .finish_non_exhaustive()
    }
}

impl ZNode {
    pub fn identity(&self) -> &NodeIdentity {
        &self.inner.identity
    }

    pub fn name(&self) -> &str {
        &self.inner.identity.name
    }

    pub fn namespace(&self) -> &str {
        &self.inner.identity.namespace
    }

    pub fn fully_qualified_name(&self) -> String {
        self.inner.identity.fully_qualified_name()
    }

    pub fn context(&self) -> &ZContext {
        &self.inner.ctx
    }

    /// Undeclare the node token. Entities already created keep working.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Create a publisher for `topic` carrying `type_name` (`pkg/msg/Name`).
    ///
    /// The topic name is qualified according to ROS 2 rules:
    /// - Absolute topics (starting with '/') are used as-is
    /// - Private topics (starting with '~') are expanded to /<namespace>/<node_name>/<topic>
    /// - Relative topics are expanded to /<namespace>/<topic>
    pub fn create_pub(&self, topic: &str, type_name: &str) -> ZPubBuilder {
        debug!("[NOD] Creating publisher: topic={}, type={}", topic, type_name);
        ZPubBuilder::new(self.endpoint(EntityKind::Publisher, topic, type_name))
    }

    pub fn create_sub(&self, topic: &str, type_name: &str) -> ZSubBuilder {
        debug!("[NOD] Creating subscriber: topic={}, type={}", topic, type_name);
        ZSubBuilder::new(self.endpoint(EntityKind::Subscription, topic, type_name))
    }

    /// Create a service server for `name` implementing `type_name` (`pkg/srv/Name`).
    pub fn create_service(&self, name: &str, type_name: &str) -> ZServerBuilder {
        debug!("[NOD] Creating service: name={}, type={}", name, type_name);
        ZServerBuilder::new(self.endpoint(EntityKind::Service, name, type_name))
    }

    pub fn create_client(&self, name: &str, type_name: &str) -> ZClientBuilder {
        debug!("[NOD] Creating client: name={}, type={}", name, type_name);
        ZClientBuilder::new(self.endpoint(EntityKind::Client, name, type_name))
    }

    fn endpoint(&self, kind: EntityKind, name: &str, type_name: &str) -> EndpointBuilder {
        let qos = if kind.is_service() {
            QosProfile::services_default()
        } else {
            QosProfile::default()
        };
        EndpointBuilder {
            node: self.clone(),
            kind,
            name: name.to_string(),
            type_name: type_name.to_string(),
            qos,
            type_hash: None,
            definition: None,
        }
    }
}

/// Settings shared by every entity builder.
pub(crate) struct EndpointBuilder {
    pub(crate) node: ZNode,
    pub(crate) kind: EntityKind,
    pub(crate) name: String,
    pub(crate) type_name: String,
    pub(crate) qos: QosProfile,
    pub(crate) type_hash: Option<TypeHash>,
    pub(crate) definition: Option<String>,
}

impl EndpointBuilder {
    pub(crate) fn ctx(&self) -> &ZContext {
        self.node.context()
    }

    fn interface(&self, expected: InterfaceKind) -> Result<TypeName> {
        let ctx = self.ctx();
        if ctx.is_closed() {
            return Err(Error::Closed("context"));
        }
        let name: TypeName = self.type_name.parse()?;
        if name.kind() != expected {
            return Err(SchemaError::InvalidTypeName(format!(
                "{} ({} endpoints need a {} type)",
                self.type_name, self.kind, expected
            ))
            .into());
        }
        // Re-registering identical text keeps the registry's memo.
        if let Some(definition) = &self.definition {
            ctx.registry().register(&self.type_name, definition)?;
        }
        Ok(name)
    }

    fn identity(&self, name: &TypeName, type_hash: TypeHash) -> Result<EndpointIdentity> {
        let node = self.node.identity();
        let topic = qualify_name(&node.namespace, &node.name, &self.name)?;
        Ok(EndpointIdentity {
            node: node.clone(),
            entity_id: self.ctx().next_id(),
            kind: self.kind,
            topic,
            type_name: dds_type_name(name),
            type_hash,
            qos: self.qos,
        })
    }

    /// Descriptor and identity of a publisher or subscription.
    pub(crate) fn resolve_message(&self) -> Result<(Arc<TypeDescriptor>, EndpointIdentity)> {
        let name = self.interface(InterfaceKind::Msg)?;
        let registry = self.ctx().registry();
        let descriptor = registry.message(&self.type_name)?;
        let type_hash = match self.type_hash {
            Some(hash) => hash,
            None => registry.message_hash(&self.type_name)?,
        };
        Ok((descriptor, self.identity(&name, type_hash)?))
    }

    /// Descriptor and identity of a service server or client.
    pub(crate) fn resolve_service(&self) -> Result<(Arc<ServiceDescriptor>, EndpointIdentity)> {
        let name = self.interface(InterfaceKind::Srv)?;
        let registry = self.ctx().registry();
        let descriptor = registry.service(&self.type_name)?;
        let type_hash = match self.type_hash {
            Some(hash) => hash,
            None => registry.service_hash(&self.type_name)?,
        };
        Ok((descriptor, self.identity(&name, type_hash)?))
    }

    pub(crate) fn declare_token(&self, identity: &EndpointIdentity) -> Result<Box<dyn Undeclare>> {
        let token_ke = identity.liveliness_token()?;
        debug!("[NOD] Liveliness token KE: {}", token_ke);
        self.ctx().transport().declare_token(&token_ke)
    }
}
