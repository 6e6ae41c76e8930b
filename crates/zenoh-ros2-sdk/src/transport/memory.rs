//! In-process transport.
//!
//! Every [`MemoryTransport`] created with [`MemoryTransport::peer`] shares one
//! bus, so entities on different "sessions" see each other exactly as they
//! would through a router. Delivery is synchronous on the caller's thread.
//! Key expressions match exactly, except a trailing `/**` which matches the
//! prefix and everything below it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use tracing::trace;
use zenoh_ros2_protocol::QosProfile;

use super::{
    LivelinessCallback, LivelinessEvent, PublisherHandle, QueryCallback, QueryResponder,
    ReplyCallback, SampleCallback, Transport, TransportQuery, TransportReply, TransportSample,
    Undeclare,
};
use crate::error::{Error, Result};

struct Declared<C> {
    key_expr: String,
    callback: C,
}

#[derive(Default)]
struct Bus {
    next_id: AtomicU64,
    subscribers: RwLock<BTreeMap<u64, Declared<SampleCallback>>>,
    queryables: RwLock<BTreeMap<u64, Declared<QueryCallback>>>,
    tokens: RwLock<BTreeMap<u64, String>>,
    liveliness_subscribers: RwLock<BTreeMap<u64, Declared<LivelinessCallback>>>,
}

impl Bus {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn matching<C: Clone>(map: &RwLock<BTreeMap<u64, Declared<C>>>, key_expr: &str) -> Vec<C> {
        // Snapshot so callbacks may declare or undeclare without deadlocking.
        map.read()
            .values()
            .filter(|d| key_matches(&d.key_expr, key_expr))
            .map(|d| d.callback.clone())
            .collect()
    }

    fn put(&self, key_expr: &str, payload: Vec<u8>, attachment: Option<Vec<u8>>) {
        let sample = TransportSample {
            key_expr: key_expr.to_string(),
            payload,
            attachment,
        };
        for callback in Self::matching(&self.subscribers, key_expr) {
            callback(sample.clone());
        }
    }

    fn liveliness(&self, event: LivelinessEvent) {
        let key_expr = match &event {
            LivelinessEvent::Put(k) | LivelinessEvent::Delete(k) => k.clone(),
        };
        for callback in Self::matching(&self.liveliness_subscribers, &key_expr) {
            callback(event.clone());
        }
    }

    fn remove_token(&self, id: u64) {
        let removed = self.tokens.write().remove(&id);
        if let Some(key_expr) = removed {
            self.liveliness(LivelinessEvent::Delete(key_expr));
        }
    }
}

fn key_matches(pattern: &str, key_expr: &str) -> bool {
    match pattern.strip_suffix("/**") {
        Some(prefix) => {
            key_expr == prefix
                || key_expr
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
        }
        None => pattern == key_expr,
    }
}

/// In-process [`Transport`].
pub struct MemoryTransport {
    bus: Arc<Bus>,
    session_id: String,
    closed: AtomicBool,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// A transport on a fresh bus.
    pub fn new() -> Self {
        Self::on_bus(Arc::new(Bus::default()))
    }

    /// Another session on the same bus.
    pub fn peer(&self) -> Self {
        Self::on_bus(self.bus.clone())
    }

    fn on_bus(bus: Arc<Bus>) -> Self {
        let session_id = format!("{:032x}", bus.next_id() + 1);
        Self {
            bus,
            session_id,
            closed: AtomicBool::new(false),
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(Error::Closed("memory transport"))
        } else {
            Ok(())
        }
    }

    /// Key expressions of the tokens currently alive on the bus.
    pub fn live_tokens(&self) -> Vec<String> {
        self.bus.tokens.read().values().cloned().collect()
    }
}

enum Slot {
    Subscriber,
    Queryable,
    Token,
    LivelinessSubscriber,
}

/// Removes its declaration from the bus when undeclared or dropped.
struct Handle {
    bus: Weak<Bus>,
    id: u64,
    slot: Slot,
}

impl Handle {
    fn remove(&self) {
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        match self.slot {
            Slot::Subscriber => {
                bus.subscribers.write().remove(&self.id);
            }
            Slot::Queryable => {
                bus.queryables.write().remove(&self.id);
            }
            Slot::Token => bus.remove_token(self.id),
            Slot::LivelinessSubscriber => {
                bus.liveliness_subscribers.write().remove(&self.id);
            }
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.remove();
    }
}

impl Undeclare for Handle {
    fn undeclare(self: Box<Self>) -> Result<()> {
        // Drop does the work.
        Ok(())
    }
}

struct MemoryPublisher {
    bus: Weak<Bus>,
    key_expr: String,
}

impl PublisherHandle for MemoryPublisher {
    fn put(&self, payload: Vec<u8>, attachment: Option<Vec<u8>>) -> Result<()> {
        let bus = self.bus.upgrade().ok_or(Error::Closed("memory transport"))?;
        trace!("memory put on {} ({} bytes)", self.key_expr, payload.len());
        bus.put(&self.key_expr, payload, attachment);
        Ok(())
    }

    fn undeclare(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

struct MemoryResponder {
    callback: ReplyCallback,
}

impl QueryResponder for MemoryResponder {
    fn reply(self: Box<Self>, key_expr: &str, payload: Vec<u8>, attachment: Option<Vec<u8>>) -> Result<()> {
        (self.callback)(TransportReply::Ok(TransportSample {
            key_expr: key_expr.to_string(),
            payload,
            attachment,
        }));
        Ok(())
    }

    fn reply_err(self: Box<Self>, payload: Vec<u8>) -> Result<()> {
        (self.callback)(TransportReply::Err(payload));
        Ok(())
    }
}

impl Transport for MemoryTransport {
    fn session_id(&self) -> String {
        self.session_id.clone()
    }

    fn declare_publisher(&self, key_expr: &str, _qos: &QosProfile) -> Result<Box<dyn PublisherHandle>> {
        self.check_open()?;
        Ok(Box::new(MemoryPublisher {
            bus: Arc::downgrade(&self.bus),
            key_expr: key_expr.to_string(),
        }))
    }

    fn declare_subscriber(&self, key_expr: &str, callback: SampleCallback) -> Result<Box<dyn Undeclare>> {
        self.check_open()?;
        let id = self.bus.next_id();
        self.bus.subscribers.write().insert(
            id,
            Declared {
                key_expr: key_expr.to_string(),
                callback,
            },
        );
        Ok(Box::new(Handle {
            bus: Arc::downgrade(&self.bus),
            id,
            slot: Slot::Subscriber,
        }))
    }

    fn declare_queryable(&self, key_expr: &str, callback: QueryCallback) -> Result<Box<dyn Undeclare>> {
        self.check_open()?;
        let id = self.bus.next_id();
        self.bus.queryables.write().insert(
            id,
            Declared {
                key_expr: key_expr.to_string(),
                callback,
            },
        );
        Ok(Box::new(Handle {
            bus: Arc::downgrade(&self.bus),
            id,
            slot: Slot::Queryable,
        }))
    }

    fn get(
        &self,
        key_expr: &str,
        payload: Vec<u8>,
        attachment: Vec<u8>,
        _timeout: Duration,
        callback: ReplyCallback,
    ) -> Result<()> {
        self.check_open()?;
        for queryable in Bus::matching(&self.bus.queryables, key_expr) {
            queryable(TransportQuery::new(
                key_expr.to_string(),
                Some(payload.clone()),
                Some(attachment.clone()),
                Box::new(MemoryResponder {
                    callback: callback.clone(),
                }),
            ));
        }
        Ok(())
    }

    fn declare_token(&self, key_expr: &str) -> Result<Box<dyn Undeclare>> {
        self.check_open()?;
        let id = self.bus.next_id();
        self.bus.tokens.write().insert(id, key_expr.to_string());
        self.bus.liveliness(LivelinessEvent::Put(key_expr.to_string()));
        Ok(Box::new(Handle {
            bus: Arc::downgrade(&self.bus),
            id,
            slot: Slot::Token,
        }))
    }

    fn declare_liveliness_subscriber(
        &self,
        key_expr: &str,
        history: bool,
        callback: LivelinessCallback,
    ) -> Result<Box<dyn Undeclare>> {
        self.check_open()?;
        // Hold the registry lock while replaying history so no token slips between.
        let id = self.bus.next_id();
        let mut subscribers = self.bus.liveliness_subscribers.write();
        if history {
            let alive: Vec<String> = self
                .bus
                .tokens
                .read()
                .values()
                .filter(|k| key_matches(key_expr, k))
                .cloned()
                .collect();
            for token in alive {
                callback(LivelinessEvent::Put(token));
            }
        }
        subscribers.insert(
            id,
            Declared {
                key_expr: key_expr.to_string(),
                callback,
            },
        );
        Ok(Box::new(Handle {
            bus: Arc::downgrade(&self.bus),
            id,
            slot: Slot::LivelinessSubscriber,
        }))
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::Recorder;
    use super::*;

    #[test]
    fn test_key_matching() {
        assert!(key_matches("0/chatter", "0/chatter"));
        assert!(!key_matches("0/chatter", "0/chatter2"));
        assert!(key_matches("@ros2_lv/0/**", "@ros2_lv/0/abc/NN"));
        assert!(key_matches("@ros2_lv/0/**", "@ros2_lv/0"));
        assert!(!key_matches("@ros2_lv/0/**", "@ros2_lv/01/abc"));
    }

    #[test]
    fn test_pub_sub_across_peers() {
        let a = MemoryTransport::new();
        let b = a.peer();
        assert_ne!(a.session_id(), b.session_id());

        let received = Recorder::new();
        let sub = b.declare_subscriber("0/chatter", received.callback()).unwrap();
        let publisher = a.declare_publisher("0/chatter", &QosProfile::default()).unwrap();
        publisher.put(vec![1, 2, 3], Some(vec![9])).unwrap();
        a.declare_publisher("0/other", &QosProfile::default())
            .unwrap()
            .put(vec![4], None)
            .unwrap();

        let samples = received.take();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].payload, [1, 2, 3]);
        assert_eq!(samples[0].attachment.as_deref(), Some(&[9u8][..]));

        sub.undeclare().unwrap();
        publisher.put(vec![1], None).unwrap();
        assert!(received.take().is_empty());
    }

    #[test]
    fn test_query_reply() {
        let transport = MemoryTransport::new();
        let _queryable = transport
            .declare_queryable(
                "0/add",
                Arc::new(|query: TransportQuery| {
                    let mut payload = query.payload.clone().unwrap_or_default();
                    payload.reverse();
                    let attachment = query.attachment.clone();
                    let key_expr = query.key_expr.clone();
                    query.reply(&key_expr, payload, attachment).unwrap();
                }),
            )
            .unwrap();

        let replies = Recorder::new();
        transport
            .get("0/add", vec![1, 2], vec![7], Duration::from_secs(1), replies.callback())
            .unwrap();
        let replies = replies.take();
        assert_eq!(
            replies,
            [TransportReply::Ok(TransportSample {
                key_expr: "0/add".into(),
                payload: vec![2, 1],
                attachment: Some(vec![7]),
            })]
        );
    }

    #[test]
    fn test_liveliness_history_and_delete() {
        let a = MemoryTransport::new();
        let b = a.peer();
        let token = a.declare_token("@ros2_lv/0/x/NN").unwrap();
        let _foreign = a.declare_token("@ros2_lv/1/y/NN").unwrap();

        let events = Recorder::new();
        let _sub = b
            .declare_liveliness_subscriber("@ros2_lv/0/**", true, events.callback())
            .unwrap();
        assert_eq!(events.take(), [LivelinessEvent::Put("@ros2_lv/0/x/NN".into())]);

        drop(token);
        assert_eq!(events.take(), [LivelinessEvent::Delete("@ros2_lv/0/x/NN".into())]);
        assert_eq!(a.live_tokens(), ["@ros2_lv/1/y/NN"]);
    }

    #[test]
    fn test_closed_transport_rejects_declarations() {
        let transport = MemoryTransport::new();
        transport.close().unwrap();
        assert!(matches!(
            transport.declare_token("@ros2_lv/0/x"),
            Err(Error::Closed(_))
        ));
    }
}
