use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, error, trace, warn};
use zenoh_ros2_cdr::WireMessage;
use zenoh_ros2_protocol::{gid, EndpointIdentity, QosHistory, QosProfile};
use zenoh_ros2_schema::{TypeDescriptor, TypeHash};

use crate::attachment::{Attachment, GidArray};
use crate::error::{Error, Result};
use crate::node::EndpointBuilder;
use crate::transport::{Declarations, PublisherHandle, TransportSample};
use crate::Builder;

pub struct ZPubBuilder {
    endpoint: EndpointBuilder,
}

impl ZPubBuilder {
    pub(crate) fn new(endpoint: EndpointBuilder) -> Self {
        Self { endpoint }
    }

    pub fn with_qos(mut self, qos: QosProfile) -> Self {
        self.endpoint.qos = qos;
        self
    }

    /// Advertise `type_hash` instead of computing it from the definition.
    pub fn with_type_hash(mut self, type_hash: TypeHash) -> Self {
        self.endpoint.type_hash = Some(type_hash);
        self
    }

    /// Register the `.msg` text of the published type before resolving it.
    pub fn with_definition<S: Into<String>>(mut self, definition: S) -> Self {
        self.endpoint.definition = Some(definition.into());
        self
    }
}

impl Builder for ZPubBuilder {
    type Output = ZPub;

    #[tracing::instrument(name = "pub_build", skip(self), fields(
        topic = %self.endpoint.name,
        type_name = %self.endpoint.type_name,
        qos = %self.endpoint.qos
    ))]
    fn build(self) -> Result<ZPub> {
        let (descriptor, identity) = self.endpoint.resolve_message()?;
        debug!("[PUB] Qualified topic: {}", identity.topic);

        let key_expr = identity.topic_key_expr();
        debug!("[PUB] Key expression: {}", key_expr);
        let transport = self.endpoint.ctx().transport();
        let gid = gid(&identity.liveliness_token()?);
        let publisher = transport.declare_publisher(&key_expr, &identity.qos)?;

        let token = match self.endpoint.declare_token(&identity) {
            Ok(token) => token,
            Err(e) => {
                if let Err(undeclare_err) = publisher.undeclare() {
                    warn!("[PUB] Failed to undeclare publisher: {undeclare_err}");
                }
                return Err(e);
            }
        };
        debug!("[PUB] Publisher ready: topic={}", identity.topic);

        Ok(ZPub {
            _node: self.endpoint.node,
            identity,
            key_expr,
            descriptor,
            sn: AtomicI64::new(0),
            gid,
            publisher: RwLock::new(Some(publisher)),
            declarations: Declarations::new(vec![token]),
        })
    }
}

/// Publishes [`WireMessage`]s on one topic.
pub struct ZPub {
    _node: crate::node::ZNode,
    identity: EndpointIdentity,
    key_expr: String,
    descriptor: Arc<TypeDescriptor>,
    sn: AtomicI64,
    gid: GidArray,
    publisher: RwLock<Option<Box<dyn PublisherHandle>>>,
    declarations: Declarations,
}

impl std::fmt::Debug for ZPub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZPub")
            .field("topic", &self.identity.topic)
            .field("key_expr", &self.key_expr)
            .finish_non_exhaustive()
    }
}

impl ZPub {
    pub fn identity(&self) -> &EndpointIdentity {
        &self.identity
    }

    pub fn topic(&self) -> &str {
        &self.identity.topic
    }

    pub fn key_expr(&self) -> &str {
        &self.key_expr
    }

    pub fn gid(&self) -> GidArray {
        self.gid
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    /// A message of the published type with every field at its default.
    pub fn new_message(&self) -> WireMessage {
        WireMessage::default_for(&self.descriptor)
    }

    fn new_attachment(&self) -> Attachment {
        let sn = self.sn.fetch_add(1, Ordering::AcqRel);
        trace!("[PUB] Creating attachment: sn={}, gid={:02x?}", sn, &self.gid[..4]);
        Attachment::new(sn, self.gid)
    }

    /// Encode `msg` and put it on the topic.
    #[tracing::instrument(name = "publish", skip(self, msg), fields(
        topic = %self.identity.topic,
        payload_len = tracing::field::Empty
    ))]
    pub fn publish(&self, msg: &WireMessage) -> Result<()> {
        let payload = zenoh_ros2_cdr::encode(&self.descriptor, msg)?;
        tracing::Span::current().record("payload_len", payload.len());
        self.publish_serialized(payload)
    }

    /// Put an already CDR-encoded payload, header included.
    pub fn publish_serialized(&self, payload: Vec<u8>) -> Result<()> {
        let publisher = self.publisher.read();
        let publisher = publisher.as_ref().ok_or(Error::Closed("publisher"))?;
        let attachment = self.new_attachment();
        publisher.put(payload, Some(attachment.encode()))
    }

    /// Sequence number the next publication will carry.
    pub fn next_sequence_number(&self) -> i64 {
        self.sn.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.publisher.read().is_none()
    }

    /// Undeclare the publisher and its token. Safe to call more than once.
    pub fn close(&self) -> Result<()> {
        let publisher = self.publisher.write().take();
        if publisher.is_some() {
            debug!("[PUB] Closing publisher: topic={}", self.identity.topic);
        }
        let undeclared = publisher.map_or(Ok(()), |p| p.undeclare());
        let released = self.declarations.close();
        undeclared.and(released)
    }
}

impl Drop for ZPub {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("[PUB] Failed to close publisher {}: {e}", self.identity.topic);
        }
    }
}

/// A decoded sample with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub message: WireMessage,
    /// Absent when the sender attached nothing or something unreadable.
    pub attachment: Option<Attachment>,
}

pub struct ZSubBuilder {
    endpoint: EndpointBuilder,
}

impl ZSubBuilder {
    pub(crate) fn new(endpoint: EndpointBuilder) -> Self {
        Self { endpoint }
    }

    pub fn with_qos(mut self, qos: QosProfile) -> Self {
        self.endpoint.qos = qos;
        self
    }

    pub fn with_type_hash(mut self, type_hash: TypeHash) -> Self {
        self.endpoint.type_hash = Some(type_hash);
        self
    }

    pub fn with_definition<S: Into<String>>(mut self, definition: S) -> Self {
        self.endpoint.definition = Some(definition.into());
        self
    }

    /// Build a subscriber that invokes `callback` for each decoded message.
    ///
    /// The callback runs on the transport's delivery thread. No queue is
    /// kept, so the `recv` family returns [`Error::NoQueue`].
    pub fn build_with_callback<F>(self, callback: F) -> Result<ZSub>
    where
        F: Fn(ReceivedMessage) + Send + Sync + 'static,
    {
        self.build_internal(Arc::new(callback), None)
    }

    fn build_internal(
        self,
        handler: Arc<dyn Fn(ReceivedMessage) + Send + Sync>,
        queue: Option<flume::Receiver<ReceivedMessage>>,
    ) -> Result<ZSub> {
        let (descriptor, identity) = self.endpoint.resolve_message()?;
        debug!("[SUB] Qualified topic: {}", identity.topic);

        let key_expr = identity.topic_key_expr();
        debug!("[SUB] Key expression: {}, qos={}", key_expr, identity.qos);

        let c_descriptor = descriptor.clone();
        let c_topic = identity.topic.clone();
        let subscriber = self.endpoint.ctx().transport().declare_subscriber(
            &key_expr,
            Arc::new(move |sample: TransportSample| {
                if let Some(received) = decode_sample(&c_descriptor, &c_topic, &sample) {
                    handler(received);
                }
            }),
        )?;
        let declarations = Declarations::new(vec![subscriber]);
        declarations.declare_with(|| self.endpoint.declare_token(&identity))?;
        debug!("[SUB] Subscriber ready: topic={}", identity.topic);

        Ok(ZSub {
            _node: self.endpoint.node,
            identity,
            key_expr,
            descriptor,
            queue,
            declarations,
        })
    }
}

impl Builder for ZSubBuilder {
    type Output = ZSub;

    #[tracing::instrument(name = "sub_build", skip(self), fields(
        topic = %self.endpoint.name,
        type_name = %self.endpoint.type_name,
        qos = %self.endpoint.qos
    ))]
    fn build(self) -> Result<ZSub> {
        let (tx, rx) = match self.endpoint.qos.history {
            QosHistory::KeepLast(depth) => flume::bounded(depth.max(1)),
            QosHistory::KeepAll => flume::unbounded(),
        };
        // A full queue drops its oldest sample, like a ROS history depth.
        let oldest = rx.clone();
        let handler = move |received: ReceivedMessage| {
            let mut pending = received;
            loop {
                match tx.try_send(pending) {
                    Ok(()) => break,
                    Err(flume::TrySendError::Full(back)) => {
                        trace!("[SUB] Queue full, dropping oldest sample");
                        let _ = oldest.try_recv();
                        pending = back;
                    }
                    Err(flume::TrySendError::Disconnected(_)) => break,
                }
            }
        };
        self.build_internal(Arc::new(handler), Some(rx))
    }
}

fn decode_sample(
    descriptor: &TypeDescriptor,
    topic: &str,
    sample: &TransportSample,
) -> Option<ReceivedMessage> {
    let message = match zenoh_ros2_cdr::decode(descriptor, &sample.payload) {
        Ok(message) => message,
        Err(e) => {
            error!("[SUB] Dropping undecodable sample on {}: {}", topic, e);
            return None;
        }
    };
    let attachment = sample
        .attachment
        .as_deref()
        .and_then(|bytes| match Attachment::decode(bytes) {
            Ok(attachment) => Some(attachment),
            Err(e) => {
                warn!("[SUB] Ignoring attachment on {}: {}", topic, e);
                None
            }
        });
    trace!("[SUB] Received message on {}", topic);
    Some(ReceivedMessage { message, attachment })
}

/// Receives [`WireMessage`]s from one topic.
pub struct ZSub {
    _node: crate::node::ZNode,
    identity: EndpointIdentity,
    key_expr: String,
    descriptor: Arc<TypeDescriptor>,
    queue: Option<flume::Receiver<ReceivedMessage>>,
    declarations: Declarations,
}

impl std::fmt::Debug for ZSub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZSub")
            .field("topic", &self.identity.topic)
            .field("key_expr", &self.key_expr)
            .field("queued", &self.queue.as_ref().map(flume::Receiver::len))
            .finish_non_exhaustive()
    }
}

impl ZSub {
    pub fn identity(&self) -> &EndpointIdentity {
        &self.identity
    }

    pub fn topic(&self) -> &str {
        &self.identity.topic
    }

    pub fn key_expr(&self) -> &str {
        &self.key_expr
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    fn queue(&self) -> Result<&flume::Receiver<ReceivedMessage>> {
        self.queue.as_ref().ok_or(Error::NoQueue)
    }

    /// Block until the next message arrives.
    pub fn recv(&self) -> Result<ReceivedMessage> {
        self.queue()?.recv().map_err(|_| Error::Closed("subscriber"))
    }

    /// Wait at most `timeout`; `None` when nothing arrived.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<ReceivedMessage>> {
        match self.queue()?.recv_timeout(timeout) {
            Ok(received) => Ok(Some(received)),
            Err(flume::RecvTimeoutError::Timeout) => Ok(None),
            Err(flume::RecvTimeoutError::Disconnected) => Err(Error::Closed("subscriber")),
        }
    }

    pub fn try_recv(&self) -> Result<Option<ReceivedMessage>> {
        match self.queue()?.try_recv() {
            Ok(received) => Ok(Some(received)),
            Err(flume::TryRecvError::Empty) => Ok(None),
            Err(flume::TryRecvError::Disconnected) => Err(Error::Closed("subscriber")),
        }
    }

    pub async fn recv_async(&self) -> Result<ReceivedMessage> {
        self.queue()?
            .recv_async()
            .await
            .map_err(|_| Error::Closed("subscriber"))
    }

    /// Whether a queued message is ready.
    pub fn is_ready(&self) -> bool {
        self.queue.as_ref().is_some_and(|q| !q.is_empty())
    }

    /// Undeclare the subscriber and its token. Safe to call more than once.
    ///
    /// Messages already queued can still be received.
    pub fn close(&self) -> Result<()> {
        debug!("[SUB] Closing subscriber: topic={}", self.identity.topic);
        self.declarations.close()
    }
}

impl Drop for ZSub {
    fn drop(&mut self) {
        if let Err(e) = self.declarations.close() {
            warn!("[SUB] Failed to close subscriber {}: {e}", self.identity.topic);
        }
    }
}

#[cfg(test)]
mod tests {
    use zenoh_ros2_protocol::QosReliability;

    use super::*;
    use crate::context::{ZContext, ZContextBuilder};
    use crate::transport::testing::{Recorder, TokenLimit};
    use crate::transport::{MemoryTransport, Transport};

    fn context() -> (Arc<MemoryTransport>, ZContext) {
        let transport = Arc::new(MemoryTransport::new());
        let ctx = ZContextBuilder::default()
            .with_domain_id(0)
            .with_transport(transport.clone())
            .build()
            .unwrap();
        (transport, ctx)
    }

    fn string_msg(data: &str) -> WireMessage {
        WireMessage::new().with("data", data)
    }

    #[test]
    fn test_publish_wire_format() {
        let (transport, ctx) = context();
        let node = ctx.create_node("talker").build().unwrap();
        let publisher = node.create_pub("/chatter", "std_msgs/msg/String").build().unwrap();

        let raw = Recorder::new();
        let _tap = transport.declare_subscriber(publisher.key_expr(), raw.callback()).unwrap();
        publisher.publish(&string_msg("Hello World!")).unwrap();
        publisher.publish(&string_msg("again")).unwrap();

        let samples = raw.take();
        assert_eq!(samples.len(), 2);
        assert_eq!(
            samples[0].payload,
            b"\x00\x01\x00\x00\x0d\x00\x00\x00Hello World!\x00".to_vec()
        );
        let first = Attachment::decode(samples[0].attachment.as_deref().unwrap()).unwrap();
        let second = Attachment::decode(samples[1].attachment.as_deref().unwrap()).unwrap();
        assert_eq!((first.sequence_number, second.sequence_number), (0, 1));
        assert_eq!(first.source_gid, publisher.gid());
        assert_eq!(publisher.next_sequence_number(), 2);
        assert!(publisher.key_expr().starts_with("0/chatter/std_msgs::msg::dds_::String_/RIHS01_"));
    }

    #[test]
    fn test_publish_rejects_bad_messages() {
        let (_transport, ctx) = context();
        let node = ctx.create_node("talker").build().unwrap();
        let publisher = node.create_pub("chatter", "std_msgs/msg/String").build().unwrap();
        assert!(matches!(
            publisher.publish(&WireMessage::new()),
            Err(Error::Cdr(_))
        ));
        assert_eq!(publisher.next_sequence_number(), 0);
        assert_eq!(publisher.new_message(), string_msg(""));
    }

    #[test]
    fn test_queue_keeps_latest() {
        let (_transport, ctx) = context();
        let node = ctx.create_node("pair").build().unwrap();
        let subscriber = node
            .create_sub("/chatter", "std_msgs/msg/String")
            .with_qos(QosProfile::default().with_history(QosHistory::KeepLast(2)))
            .build()
            .unwrap();
        let publisher = node.create_pub("/chatter", "std_msgs/msg/String").build().unwrap();

        for data in ["a", "b", "c"] {
            publisher.publish(&string_msg(data)).unwrap();
        }
        assert!(subscriber.is_ready());
        let first = subscriber.try_recv().unwrap().unwrap();
        assert_eq!(first.message, string_msg("b"));
        assert_eq!(first.attachment.unwrap().sequence_number, 1);
        let second = subscriber.recv_timeout(Duration::from_millis(10)).unwrap().unwrap();
        assert_eq!(second.message, string_msg("c"));
        assert!(subscriber.try_recv().unwrap().is_none());
        assert!(subscriber.recv_timeout(Duration::from_millis(10)).unwrap().is_none());
    }

    #[test]
    fn test_malformed_samples_are_dropped() {
        let (transport, ctx) = context();
        let node = ctx.create_node("listener").build().unwrap();
        let received = Recorder::new();
        let callback = received.callback();
        let subscriber = node
            .create_sub("/chatter", "std_msgs/msg/String")
            .build_with_callback(move |msg| callback(msg))
            .unwrap();
        assert!(matches!(subscriber.try_recv(), Err(Error::NoQueue)));

        let raw = transport
            .declare_publisher(subscriber.key_expr(), &QosProfile::default())
            .unwrap();
        raw.put(vec![0x00, 0x01, 0x00, 0x00, 0xFF], None).unwrap();
        raw.put(b"\x00\x01\x00\x00\x03\x00\x00\x00ok\x00".to_vec(), Some(vec![1, 2]))
            .unwrap();

        let received = received.take();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].message, string_msg("ok"));
        assert_eq!(received[0].attachment, None);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (transport, ctx) = context();
        let node = ctx.create_node("talker").build().unwrap();
        let publisher = node
            .create_pub("/chatter", "std_msgs/msg/String")
            .with_qos(QosProfile::sensor_data().with_reliability(QosReliability::BestEffort))
            .build()
            .unwrap();
        let subscriber = node.create_sub("/chatter", "std_msgs/msg/String").build().unwrap();
        assert_eq!(transport.live_tokens().len(), 3);

        publisher.close().unwrap();
        publisher.close().unwrap();
        assert!(publisher.is_closed());
        assert!(matches!(
            publisher.publish(&string_msg("late")),
            Err(Error::Closed(_))
        ));
        subscriber.close().unwrap();
        subscriber.close().unwrap();
        assert!(matches!(subscriber.recv(), Err(Error::Closed(_))));
        assert_eq!(transport.live_tokens().len(), 1);
    }

    #[test]
    fn test_failed_token_releases_declarations() {
        let bus = MemoryTransport::new();
        // Only the node token is granted.
        let limited = Arc::new(TokenLimit::new(bus.peer(), 1));
        let ctx = ZContextBuilder::default()
            .with_domain_id(0)
            .with_transport(limited.clone())
            .build()
            .unwrap();
        let node = ctx.create_node("talker").build().unwrap();

        assert!(matches!(
            node.create_pub("/chatter", "std_msgs/msg/String").build(),
            Err(Error::Closed(_))
        ));
        assert_eq!(limited.live_publishers(), 0);

        let received = Recorder::new();
        let callback = received.callback();
        assert!(
            node.create_sub("/chatter", "std_msgs/msg/String")
                .build_with_callback(move |msg| callback(msg))
                .is_err()
        );

        let other = ZContextBuilder::default()
            .with_domain_id(0)
            .with_transport(Arc::new(bus.peer()))
            .build()
            .unwrap();
        let other_node = other.create_node("other").build().unwrap();
        let publisher = other_node
            .create_pub("/chatter", "std_msgs/msg/String")
            .build()
            .unwrap();
        publisher.publish(&string_msg("nobody")).unwrap();
        assert!(received.take().is_empty());
        assert_eq!(bus.live_tokens().len(), 3);
    }
}
