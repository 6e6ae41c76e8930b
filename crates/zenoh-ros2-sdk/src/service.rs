use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};
use zenoh_ros2_cdr::WireMessage;
use zenoh_ros2_protocol::{gid, EndpointIdentity, QosProfile};
use zenoh_ros2_schema::{ServiceDescriptor, TypeHash};

use crate::attachment::{Attachment, CorrelationKey, GidArray};
use crate::error::{Error, Result};
use crate::node::{EndpointBuilder, ZNode};
use crate::transport::{Declarations, TransportQuery, TransportReply};
use crate::Builder;

/// Query timeout of [`ZClient::call_async`] unless set on the builder.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ZServerBuilder {
    endpoint: EndpointBuilder,
}

impl ZServerBuilder {
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

    /// Register the `.srv` text of the service type before resolving it.
    pub fn with_definition<S: Into<String>>(mut self, definition: S) -> Self {
        self.endpoint.definition = Some(definition.into());
        self
    }

    /// Build a server answering every request with `handler`.
    ///
    /// The handler runs on the transport's delivery thread. An `Err` is sent
    /// back to the caller as an error reply.
    pub fn build_with_handler<F>(self, handler: F) -> Result<ZServer>
    where
        F: Fn(WireMessage) -> Result<WireMessage> + Send + Sync + 'static,
    {
        self.build_internal(Arc::new(move |request: ServiceRequest| {
            let outcome = handler(request.message.clone());
            let replied = match outcome {
                Ok(response) => request.respond(&response),
                Err(e) => request.reject(&format!("service handler failed: {e}")),
            };
            if let Err(e) = replied {
                error!("[SRV] Failed to reply: {e}");
            }
        }), None)
    }

    fn build_internal(
        self,
        handler: Arc<dyn Fn(ServiceRequest) + Send + Sync>,
        queue: Option<flume::Receiver<ServiceRequest>>,
    ) -> Result<ZServer> {
        let (descriptor, identity) = self.endpoint.resolve_service()?;
        debug!("[SRV] Qualified service: {}", identity.topic);

        let key_expr = identity.topic_key_expr();
        debug!("[SRV] KE: {key_expr}");

        let shared = Arc::new(ServerShared {
            descriptor: descriptor.clone(),
            key_expr: key_expr.clone(),
            service: identity.topic.clone(),
        });
        let queryable = self.endpoint.ctx().transport().declare_queryable(
            &key_expr,
            Arc::new(move |query: TransportQuery| {
                trace!("[SRV] Query received: ke={}", query.key_expr);
                if let Some(request) = ServiceRequest::accept(&shared, query) {
                    handler(request);
                }
            }),
        )?;
        let declarations = Declarations::new(vec![queryable]);
        declarations.declare_with(|| self.endpoint.declare_token(&identity))?;
        debug!("[SRV] Server ready: service={}", identity.topic);

        Ok(ZServer {
            _node: self.endpoint.node,
            identity,
            key_expr,
            descriptor,
            queue,
            declarations,
        })
    }
}

impl Builder for ZServerBuilder {
    type Output = ZServer;

    /// Build a server that queues requests for [`ZServer::take_request`].
    #[tracing::instrument(name = "srv_build", skip(self), fields(
        service = %self.endpoint.name,
        type_name = %self.endpoint.type_name
    ))]
    fn build(self) -> Result<ZServer> {
        let (tx, rx) = flume::unbounded();
        let handler = move |request: ServiceRequest| {
            if let Err(flume::SendError(request)) = tx.send(request) {
                let _ = request.reject("service server is closed");
            }
        };
        self.build_internal(Arc::new(handler), Some(rx))
    }
}

struct ServerShared {
    descriptor: Arc<ServiceDescriptor>,
    key_expr: String,
    service: String,
}

/// A decoded request waiting for its response.
pub struct ServiceRequest {
    message: WireMessage,
    attachment: Attachment,
    query: TransportQuery,
    shared: Arc<ServerShared>,
}

impl std::fmt::Debug for ServiceRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRequest")
            .field("service", &self.shared.service)
            .field("message", &self.message)
            .field("attachment", &self.attachment)
            .finish_non_exhaustive()
    }
}

impl ServiceRequest {
    /// Validate and decode an incoming query, rejecting it when unusable.
    fn accept(shared: &Arc<ServerShared>, query: TransportQuery) -> Option<Self> {
        let problem = match (&query.payload, &query.attachment) {
            (None, _) => Some("service request has no payload".to_string()),
            (Some(p), _) if p.is_empty() => Some("service request payload is empty".to_string()),
            (_, None) => Some("service request has no attachment".to_string()),
            _ => None,
        };
        if let Some(reason) = problem {
            reject(&shared.service, query, &reason);
            return None;
        }

        let decoded = query.attachment.as_deref().map(Attachment::decode);
        let attachment = match decoded {
            Some(Ok(attachment)) => attachment,
            Some(Err(e)) => {
                reject(&shared.service, query, &e.to_string());
                return None;
            }
            None => return None,
        };
        let payload = query.payload.as_deref().unwrap_or_default();
        let message = match zenoh_ros2_cdr::decode(shared.descriptor.request(), payload) {
            Ok(message) => message,
            Err(e) => {
                reject(&shared.service, query, &format!("failed to decode request: {e}"));
                return None;
            }
        };
        debug!(
            "[SRV] Request received: service={}, sn={}",
            shared.service, attachment.sequence_number
        );
        Some(Self {
            message,
            attachment,
            query,
            shared: shared.clone(),
        })
    }

    pub fn message(&self) -> &WireMessage {
        &self.message
    }

    pub fn attachment(&self) -> &Attachment {
        &self.attachment
    }

    /// Send `response`, echoing the request's sequence number and gid.
    pub fn respond(self, response: &WireMessage) -> Result<()> {
        let payload = match zenoh_ros2_cdr::encode(self.shared.descriptor.response(), response) {
            Ok(payload) => payload,
            Err(e) => {
                let reason = format!("failed to encode response: {e}");
                reject(&self.shared.service, self.query, &reason);
                return Err(e.into());
            }
        };
        debug!("[SRV] Sending response: sn={}", self.attachment.sequence_number);
        let attachment = self.attachment.reply().encode();
        self.query.reply(&self.shared.key_expr, payload, Some(attachment))
    }

    /// Send an error reply instead of a response.
    pub fn reject(self, reason: &str) -> Result<()> {
        error!("[SRV] Rejecting request on {}: {}", self.shared.service, reason);
        self.query.reply_err(reason.as_bytes().to_vec())
    }
}

fn reject(service: &str, query: TransportQuery, reason: &str) {
    error!("[SRV] Rejecting request on {}: {}", service, reason);
    if let Err(e) = query.reply_err(reason.as_bytes().to_vec()) {
        warn!("[SRV] Failed to send error reply: {e}");
    }
}

/// Answers requests for one service.
pub struct ZServer {
    _node: ZNode,
    identity: EndpointIdentity,
    key_expr: String,
    descriptor: Arc<ServiceDescriptor>,
    queue: Option<flume::Receiver<ServiceRequest>>,
    declarations: Declarations,
}

impl std::fmt::Debug for ZServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZServer")
            .field("service", &self.identity.topic)
            .field("key_expr", &self.key_expr)
            .finish_non_exhaustive()
    }
}

impl ZServer {
    pub fn identity(&self) -> &EndpointIdentity {
        &self.identity
    }

    pub fn key_expr(&self) -> &str {
        &self.key_expr
    }

    pub fn descriptor(&self) -> &Arc<ServiceDescriptor> {
        &self.descriptor
    }

    fn queue(&self) -> Result<&flume::Receiver<ServiceRequest>> {
        self.queue.as_ref().ok_or(Error::NoQueue)
    }

    /// Block until the next request arrives.
    pub fn take_request(&self) -> Result<ServiceRequest> {
        self.queue()?.recv().map_err(|_| Error::Closed("service server"))
    }

    pub fn take_request_timeout(&self, timeout: Duration) -> Result<Option<ServiceRequest>> {
        match self.queue()?.recv_timeout(timeout) {
            Ok(request) => Ok(Some(request)),
            Err(flume::RecvTimeoutError::Timeout) => Ok(None),
            Err(flume::RecvTimeoutError::Disconnected) => Err(Error::Closed("service server")),
        }
    }

    pub fn try_take_request(&self) -> Result<Option<ServiceRequest>> {
        match self.queue()?.try_recv() {
            Ok(request) => Ok(Some(request)),
            Err(flume::TryRecvError::Empty) => Ok(None),
            Err(flume::TryRecvError::Disconnected) => Err(Error::Closed("service server")),
        }
    }

    pub async fn take_request_async(&self) -> Result<ServiceRequest> {
        self.queue()?
            .recv_async()
            .await
            .map_err(|_| Error::Closed("service server"))
    }

    /// Undeclare the queryable and its token. Safe to call more than once.
    pub fn close(&self) -> Result<()> {
        debug!("[SRV] Closing server: service={}", self.identity.topic);
        self.declarations.close()
    }
}

impl Drop for ZServer {
    fn drop(&mut self) {
        if let Err(e) = self.declarations.close() {
            warn!("[SRV] Failed to close server {}: {e}", self.identity.topic);
        }
    }
}

type Waiters = Arc<Mutex<HashMap<CorrelationKey, flume::Sender<Result<WireMessage>>>>>;

pub struct ZClientBuilder {
    endpoint: EndpointBuilder,
    timeout: Duration,
}

impl ZClientBuilder {
    pub(crate) fn new(endpoint: EndpointBuilder) -> Self {
        Self {
            endpoint,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
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

    /// How long the transport keeps collecting replies of an asynchronous call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Builder for ZClientBuilder {
    type Output = ZClient;

    #[tracing::instrument(name = "cln_build", skip(self), fields(
        service = %self.endpoint.name,
        type_name = %self.endpoint.type_name
    ))]
    fn build(self) -> Result<ZClient> {
        let (descriptor, identity) = self.endpoint.resolve_service()?;
        debug!("[CLN] Qualified service: {}", identity.topic);

        let key_expr = identity.topic_key_expr();
        debug!("[CLN] Key expression: {}", key_expr);

        let gid = gid(&identity.liveliness_token()?);
        let token = self.endpoint.declare_token(&identity)?;
        debug!("[CLN] Client ready: service={}", identity.topic);

        Ok(ZClient {
            node: self.endpoint.node,
            identity,
            key_expr,
            descriptor,
            // Start at 1 for ROS compatibility
            sn: AtomicI64::new(1),
            gid,
            timeout: self.timeout,
            waiters: Arc::new(Mutex::new(HashMap::new())),
            closed: AtomicBool::new(false),
            declarations: Declarations::new(vec![token]),
        })
    }
}

/// Calls one service.
///
/// Responses are matched to requests by [`CorrelationKey`], so any number of
/// calls may be in flight at once.
pub struct ZClient {
    node: ZNode,
    identity: EndpointIdentity,
    key_expr: String,
    descriptor: Arc<ServiceDescriptor>,
    sn: AtomicI64,
    gid: GidArray,
    timeout: Duration,
    waiters: Waiters,
    closed: AtomicBool,
    declarations: Declarations,
}

impl std::fmt::Debug for ZClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZClient")
            .field("service", &self.identity.topic)
            .field("key_expr", &self.key_expr)
            .field("in_flight", &self.waiters.lock().len())
            .finish_non_exhaustive()
    }
}

impl ZClient {
    pub fn identity(&self) -> &EndpointIdentity {
        &self.identity
    }

    pub fn key_expr(&self) -> &str {
        &self.key_expr
    }

    pub fn gid(&self) -> GidArray {
        self.gid
    }

    pub fn descriptor(&self) -> &Arc<ServiceDescriptor> {
        &self.descriptor
    }

    /// A request with every field at its default.
    pub fn new_request(&self) -> WireMessage {
        WireMessage::default_for(self.descriptor.request())
    }

    /// Number of calls still waiting for a response.
    pub fn in_flight(&self) -> usize {
        self.waiters.lock().len()
    }

    /// Block until a server for this service shows up on the graph.
    pub fn wait_for_service(&self, timeout: Duration) -> bool {
        self.node
            .context()
            .graph()
            .wait_for_service(&self.identity.topic, timeout)
    }

    /// Call the service and wait at most `timeout` for the response.
    ///
    /// Returns `Ok(None)` on timeout.
    #[tracing::instrument(name = "call", skip(self, request), fields(service = %self.identity.topic))]
    pub fn call(&self, request: &WireMessage, timeout: Duration) -> Result<Option<WireMessage>> {
        let pending = self.send(request, timeout)?;
        pending.wait(timeout)
    }

    /// Send a request without waiting. Dropping the handle abandons the call.
    pub fn call_async(&self, request: &WireMessage) -> Result<PendingResponse> {
        self.send(request, self.timeout)
    }

    fn send(&self, request: &WireMessage, timeout: Duration) -> Result<PendingResponse> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed("service client"));
        }
        let payload = zenoh_ros2_cdr::encode(self.descriptor.request(), request)?;
        let attachment = Attachment::new(self.sn.fetch_add(1, Ordering::AcqRel), self.gid);
        let key = attachment.correlation_key();

        let (tx, rx) = flume::bounded(1);
        self.waiters.lock().insert(key, tx);
        debug!(
            "[CLN] Sending request: sn={}, payload_len={}",
            key.sequence_number,
            payload.len()
        );

        let waiters = self.waiters.clone();
        let response = self.descriptor.response().clone();
        let service = self.identity.topic.clone();
        let sent = self.node.context().transport().get(
            &self.key_expr,
            payload,
            attachment.encode(),
            timeout,
            Arc::new(move |reply: TransportReply| {
                let (reply_key, result) = match reply {
                    TransportReply::Ok(sample) => {
                        let reply_key = match sample.attachment.as_deref().map(Attachment::decode) {
                            Some(Ok(att)) => att.correlation_key(),
                            Some(Err(e)) => {
                                warn!("[CLN] Reply on {} has a bad attachment: {}", service, e);
                                return;
                            }
                            None => key,
                        };
                        let result = zenoh_ros2_cdr::decode(&response, &sample.payload)
                            .map_err(Error::from);
                        (reply_key, result)
                    }
                    TransportReply::Err(payload) => {
                        let reason = String::from_utf8_lossy(&payload).into_owned();
                        warn!("[CLN] Reply error on {}: {}", service, reason);
                        (key, Err(Error::ServiceError(reason)))
                    }
                };
                match waiters.lock().remove(&reply_key) {
                    Some(tx) => {
                        trace!("[CLN] Reply matched: sn={}", reply_key.sequence_number);
                        let _ = tx.send(result);
                    }
                    None => debug!(
                        "[CLN] Dropping reply with no waiter: sn={}",
                        reply_key.sequence_number
                    ),
                }
            }),
        );
        if let Err(e) = sent {
            self.waiters.lock().remove(&key);
            return Err(e);
        }

        Ok(PendingResponse {
            key,
            rx,
            waiters: self.waiters.clone(),
        })
    }

    /// Undeclare the client token and fail every call still waiting.
    /// Safe to call more than once.
    pub fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("[CLN] Closing client: service={}", self.identity.topic);
        }
        self.waiters.lock().clear();
        self.declarations.close()
    }
}

impl Drop for ZClient {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("[CLN] Failed to close client {}: {e}", self.identity.topic);
        }
    }
}

/// Handle on an in-flight call.
pub struct PendingResponse {
    key: CorrelationKey,
    rx: flume::Receiver<Result<WireMessage>>,
    waiters: Waiters,
}

impl std::fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResponse")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl PendingResponse {
    pub fn key(&self) -> CorrelationKey {
        self.key
    }

    /// Wait at most `timeout`; `Ok(None)` when no response arrived in time.
    pub fn wait(&self, timeout: Duration) -> Result<Option<WireMessage>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result.map(Some),
            Err(flume::RecvTimeoutError::Timeout) => {
                debug!("[CLN] Call timed out: sn={}", self.key.sequence_number);
                Ok(None)
            }
            Err(flume::RecvTimeoutError::Disconnected) => Err(Error::Closed("service call")),
        }
    }

    /// The response if it already arrived.
    pub fn try_take(&self) -> Result<Option<WireMessage>> {
        match self.rx.try_recv() {
            Ok(result) => result.map(Some),
            Err(flume::TryRecvError::Empty) => Ok(None),
            Err(flume::TryRecvError::Disconnected) => Err(Error::Closed("service call")),
        }
    }

    pub async fn wait_async(&self) -> Result<WireMessage> {
        self.rx
            .recv_async()
            .await
            .map_err(|_| Error::Closed("service call"))?
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.waiters.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ZContext, ZContextBuilder};
    use crate::transport::testing::{Recorder, TokenLimit};
    use crate::transport::{MemoryTransport, Transport};

    fn context() -> (Arc<MemoryTransport>, ZContext) {
        let transport = Arc::new(MemoryTransport::new());
        let ctx = ZContextBuilder::default()
            .with_transport(transport.clone())
            .with_domain_id(0)
            .build()
            .unwrap();
        (transport, ctx)
    }

    fn add(a: i64, b: i64) -> WireMessage {
        WireMessage::new().with("a", a).with("b", b)
    }

    fn sum_handler(request: WireMessage) -> Result<WireMessage> {
        let a = request.get("a").and_then(|v| v.as_i64()).unwrap_or_default();
        let b = request.get("b").and_then(|v| v.as_i64()).unwrap_or_default();
        Ok(WireMessage::new().with("sum", a + b))
    }

    #[test]
    fn test_handler_round_trip() {
        let (_transport, ctx) = context();
        let node = ctx.create_node("adder").build().unwrap();
        let server = node
            .create_service("add_two_ints", "example_interfaces/srv/AddTwoInts")
            .build_with_handler(sum_handler)
            .unwrap();
        let client = node
            .create_client("add_two_ints", "example_interfaces/srv/AddTwoInts")
            .build()
            .unwrap();
        assert_eq!(server.key_expr(), client.key_expr());
        assert!(
            client
                .key_expr()
                .starts_with("0/add_two_ints/example_interfaces::srv::dds_::AddTwoInts_/RIHS01_")
        );

        let response = client.call(&add(2, 3), Duration::from_secs(1)).unwrap();
        assert_eq!(response, Some(WireMessage::new().with("sum", 5i64)));
        assert_eq!(client.in_flight(), 0);
    }

    #[test]
    fn test_handler_error_becomes_service_error() {
        let (_transport, ctx) = context();
        let node = ctx.create_node("adder").build().unwrap();
        let _server = node
            .create_service("/add", "example_interfaces/srv/AddTwoInts")
            .build_with_handler(|_| Err(Error::ServiceError("overflow".into())))
            .unwrap();
        let client = node
            .create_client("/add", "example_interfaces/srv/AddTwoInts")
            .build()
            .unwrap();
        let result = client.call(&add(1, 1), Duration::from_secs(1));
        assert!(matches!(result, Err(Error::ServiceError(reason)) if reason.contains("overflow")));
    }

    #[test]
    fn test_server_rejects_invalid_queries() {
        let (transport, ctx) = context();
        let node = ctx.create_node("adder").build().unwrap();
        let server = node
            .create_service("/add", "example_interfaces/srv/AddTwoInts")
            .build_with_handler(sum_handler)
            .unwrap();

        let replies = Recorder::new();
        let payload = zenoh_ros2_cdr::encode(server.descriptor().request(), &add(1, 2)).unwrap();
        let timeout = Duration::from_secs(1);

        // Attachment too short to decode.
        transport
            .get(server.key_expr(), payload, vec![1, 2, 3], timeout, replies.callback())
            .unwrap();
        // Encapsulation header only.
        transport
            .get(
                server.key_expr(),
                vec![0, 1, 0, 0],
                Attachment::new(1, [0; 16]).encode(),
                timeout,
                replies.callback(),
            )
            .unwrap();
        transport
            .get(
                server.key_expr(),
                Vec::new(),
                Attachment::new(2, [0; 16]).encode(),
                timeout,
                replies.callback(),
            )
            .unwrap();

        let replies = replies.take();
        assert_eq!(replies.len(), 3);
        assert!(replies.iter().all(|r| matches!(r, TransportReply::Err(_))));
    }

    #[test]
    fn test_queued_server() {
        let (_transport, ctx) = context();
        let node = ctx.create_node("adder").build().unwrap();
        let server = node
            .create_service("/add", "example_interfaces/srv/AddTwoInts")
            .build()
            .unwrap();
        let client = node
            .create_client("/add", "example_interfaces/srv/AddTwoInts")
            .build()
            .unwrap();

        let pending = client.call_async(&add(4, 5)).unwrap();
        assert!(pending.try_take().unwrap().is_none());

        let request = server.try_take_request().unwrap().unwrap();
        assert_eq!(request.attachment().sequence_number, 1);
        assert_eq!(request.attachment().source_gid, client.gid());
        let response = sum_handler(request.message().clone()).unwrap();
        request.respond(&response).unwrap();

        assert_eq!(
            pending.wait(Duration::from_millis(100)).unwrap(),
            Some(WireMessage::new().with("sum", 9i64))
        );
        assert!(server.try_take_request().unwrap().is_none());
    }

    #[test]
    fn test_timeout_and_abandoned_calls() {
        let (_transport, ctx) = context();
        let node = ctx.create_node("caller").build().unwrap();
        let client = node
            .create_client("/nobody", "std_srvs/srv/Trigger")
            .build()
            .unwrap();
        let request = client.new_request();
        assert_eq!(client.call(&request, Duration::from_millis(20)).unwrap(), None);
        assert_eq!(client.in_flight(), 0);

        let pending = client.call_async(&request).unwrap();
        assert_eq!(pending.key().sequence_number, 2);
        assert_eq!(client.in_flight(), 1);
        drop(pending);
        assert_eq!(client.in_flight(), 0);
        assert!(!client.wait_for_service(Duration::from_millis(10)));
    }

    #[test]
    fn test_close_fails_waiters() {
        let (transport, ctx) = context();
        let node = ctx.create_node("caller").build().unwrap();
        let client = node
            .create_client("/nobody", "std_srvs/srv/Trigger")
            .build()
            .unwrap();
        let pending = client.call_async(&client.new_request()).unwrap();
        client.close().unwrap();
        client.close().unwrap();
        assert!(matches!(pending.try_take(), Err(Error::Closed(_))));
        assert!(matches!(
            client.call_async(&client.new_request()),
            Err(Error::Closed(_))
        ));
        assert_eq!(transport.live_tokens().len(), 1);
    }

    #[test]
    fn test_failed_token_releases_queryable() {
        let bus = MemoryTransport::new();
        let limited = Arc::new(TokenLimit::new(bus.peer(), 1));
        let ctx = ZContextBuilder::default()
            .with_domain_id(0)
            .with_transport(limited)
            .build()
            .unwrap();
        let node = ctx.create_node("adder").build().unwrap();
        assert!(matches!(
            node.create_service("/add", "example_interfaces/srv/AddTwoInts")
                .build_with_handler(sum_handler),
            Err(Error::Closed(_))
        ));

        let other = ZContextBuilder::default()
            .with_domain_id(0)
            .with_transport(Arc::new(bus.peer()))
            .build()
            .unwrap();
        let caller = other.create_node("caller").build().unwrap();
        let client = caller
            .create_client("/add", "example_interfaces/srv/AddTwoInts")
            .build()
            .unwrap();
        assert_eq!(client.call(&add(1, 2), Duration::from_millis(20)).unwrap(), None);
    }
}
