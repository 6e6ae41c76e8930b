//! The pub/sub/query seam between ROS 2 entities and the network.
//!
//! Entities only ever talk to a [`Transport`]. [`ZenohTransport`] backs it
//! with a real Zenoh session; [`MemoryTransport`] routes everything in
//! process for tests and embedding.

mod memory;
mod zenoh_session;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::warn;
use zenoh_ros2_protocol::QosProfile;

use crate::error::Result;

pub use self::memory::MemoryTransport;
#[cfg(test)]
pub(crate) use self::memory::testing;
pub use self::zenoh_session::ZenohTransport;

/// A received data sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSample {
    pub key_expr: String,
    pub payload: Vec<u8>,
    pub attachment: Option<Vec<u8>>,
}

/// Answers one query. Consumed by the first reply.
pub trait QueryResponder: Send {
    fn reply(self: Box<Self>, key_expr: &str, payload: Vec<u8>, attachment: Option<Vec<u8>>) -> Result<()>;
    fn reply_err(self: Box<Self>, payload: Vec<u8>) -> Result<()>;
}

/// An incoming query, answered exactly once.
pub struct TransportQuery {
    pub key_expr: String,
    pub payload: Option<Vec<u8>>,
    pub attachment: Option<Vec<u8>>,
    responder: Box<dyn QueryResponder>,
}

impl TransportQuery {
    pub fn new(
        key_expr: String,
        payload: Option<Vec<u8>>,
        attachment: Option<Vec<u8>>,
        responder: Box<dyn QueryResponder>,
    ) -> Self {
        Self {
            key_expr,
            payload,
            attachment,
            responder,
        }
    }

    pub fn reply(self, key_expr: &str, payload: Vec<u8>, attachment: Option<Vec<u8>>) -> Result<()> {
        self.responder.reply(key_expr, payload, attachment)
    }

    pub fn reply_err(self, payload: Vec<u8>) -> Result<()> {
        self.responder.reply_err(payload)
    }
}

impl std::fmt::Debug for TransportQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportQuery")
            .field("key_expr", &self.key_expr)
            .field("payload_len", &self.payload.as_ref().map(Vec::len))
            .field("has_attachment", &self.attachment.is_some())
            .finish_non_exhaustive()
    }
}

/// One reply to a `get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportReply {
    Ok(TransportSample),
    Err(Vec<u8>),
}

/// Appearance or disappearance of a liveliness token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LivelinessEvent {
    Put(String),
    Delete(String),
}

pub type SampleCallback = Arc<dyn Fn(TransportSample) + Send + Sync>;
pub type QueryCallback = Arc<dyn Fn(TransportQuery) + Send + Sync>;
pub type ReplyCallback = Arc<dyn Fn(TransportReply) + Send + Sync>;
pub type LivelinessCallback = Arc<dyn Fn(LivelinessEvent) + Send + Sync>;

/// Anything declared on a transport that can be taken down again.
pub trait Undeclare: Send + Sync {
    fn undeclare(self: Box<Self>) -> Result<()>;
}

/// Declarations owned by one entity, released together.
#[derive(Default)]
pub(crate) struct Declarations(Mutex<Vec<Box<dyn Undeclare>>>);

impl Declarations {
    pub(crate) fn new(items: Vec<Box<dyn Undeclare>>) -> Self {
        Self(Mutex::new(items))
    }

    /// Add the result of `declare`. If it failed, everything held so far is
    /// undeclared and the declaration error is returned.
    pub(crate) fn declare_with(
        &self,
        declare: impl FnOnce() -> Result<Box<dyn Undeclare>>,
    ) -> Result<()> {
        match declare() {
            Ok(item) => {
                self.0.lock().push(item);
                Ok(())
            }
            Err(e) => {
                if let Err(close_err) = self.close() {
                    warn!("Failed to release partial declarations: {close_err}");
                }
                Err(e)
            }
        }
    }

    /// Undeclare in reverse declaration order. Later calls are no-ops.
    ///
    /// Every item is undeclared even if one fails; the first error is returned.
    pub(crate) fn close(&self) -> Result<()> {
        let items = std::mem::take(&mut *self.0.lock());
        let mut result = Ok(());
        for item in items.into_iter().rev() {
            let outcome = item.undeclare();
            if result.is_ok() {
                result = outcome;
            }
        }
        result
    }
}

/// A declared publisher.
pub trait PublisherHandle: Send + Sync {
    fn put(&self, payload: Vec<u8>, attachment: Option<Vec<u8>>) -> Result<()>;
    fn undeclare(self: Box<Self>) -> Result<()>;
}

/// Session-level operations entities need.
///
/// Callbacks run on the transport's delivery threads and must not block on
/// replies of the same transport.
pub trait Transport: Send + Sync {
    /// Identifier of this session, a single key expression segment.
    fn session_id(&self) -> String;

    fn declare_publisher(&self, key_expr: &str, qos: &QosProfile) -> Result<Box<dyn PublisherHandle>>;

    fn declare_subscriber(&self, key_expr: &str, callback: SampleCallback) -> Result<Box<dyn Undeclare>>;

    fn declare_queryable(&self, key_expr: &str, callback: QueryCallback) -> Result<Box<dyn Undeclare>>;

    /// Send a query; every reply is passed to `callback` until `timeout`.
    fn get(
        &self,
        key_expr: &str,
        payload: Vec<u8>,
        attachment: Vec<u8>,
        timeout: Duration,
        callback: ReplyCallback,
    ) -> Result<()>;

    fn declare_token(&self, key_expr: &str) -> Result<Box<dyn Undeclare>>;

    /// Watch tokens matching `key_expr`. With `history`, tokens alive at
    /// declaration time are reported first.
    fn declare_liveliness_subscriber(
        &self,
        key_expr: &str,
        history: bool,
        callback: LivelinessCallback,
    ) -> Result<Box<dyn Undeclare>>;

    fn close(&self) -> Result<()>;
}
