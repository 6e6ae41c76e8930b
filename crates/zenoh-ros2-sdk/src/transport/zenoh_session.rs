use std::time::Duration;

use tracing::debug;
use zenoh::bytes::{Encoding, ZBytes};
use zenoh::liveliness::LivelinessToken;
use zenoh::pubsub::{Publisher, Subscriber};
use zenoh::qos::CongestionControl;
use zenoh::query::{ConsolidationMode, Query, QueryTarget, Queryable, Reply};
use zenoh::sample::{Sample, SampleKind};
use zenoh::{Session, Wait};
use zenoh_ros2_protocol::{QosProfile, QosReliability};

use super::{
    LivelinessCallback, LivelinessEvent, PublisherHandle, QueryCallback, QueryResponder,
    ReplyCallback, SampleCallback, Transport, TransportQuery, TransportReply, TransportSample,
    Undeclare,
};
use crate::error::Result;

/// [`Transport`] over a Zenoh session.
pub struct ZenohTransport {
    session: Session,
}

impl ZenohTransport {
    pub fn open(config: zenoh::Config) -> Result<Self> {
        let session = zenoh::open(config).wait()?;
        debug!("[CTX] Zenoh session opened: zid={}", session.zid());
        Ok(Self { session })
    }

    pub fn from_session(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

fn to_vec(bytes: &ZBytes) -> Vec<u8> {
    bytes.to_bytes().into_owned()
}

fn to_sample(sample: &Sample) -> TransportSample {
    TransportSample {
        key_expr: sample.key_expr().to_string(),
        payload: to_vec(sample.payload()),
        attachment: sample.attachment().map(to_vec),
    }
}

struct ZenohPublisher(Publisher<'static>);

impl PublisherHandle for ZenohPublisher {
    fn put(&self, payload: Vec<u8>, attachment: Option<Vec<u8>>) -> Result<()> {
        let mut put = self.0.put(payload);
        if let Some(attachment) = attachment {
            put = put.attachment(attachment);
        }
        Ok(put.wait()?)
    }

    fn undeclare(self: Box<Self>) -> Result<()> {
        Ok(self.0.undeclare().wait()?)
    }
}

struct ZenohSubscriber(Subscriber<()>);

impl Undeclare for ZenohSubscriber {
    fn undeclare(self: Box<Self>) -> Result<()> {
        Ok(self.0.undeclare().wait()?)
    }
}

struct ZenohQueryable(Queryable<()>);

impl Undeclare for ZenohQueryable {
    fn undeclare(self: Box<Self>) -> Result<()> {
        Ok(self.0.undeclare().wait()?)
    }
}

struct ZenohToken(LivelinessToken);

impl Undeclare for ZenohToken {
    fn undeclare(self: Box<Self>) -> Result<()> {
        Ok(self.0.undeclare().wait()?)
    }
}

struct ZenohResponder(Query);

impl QueryResponder for ZenohResponder {
    fn reply(self: Box<Self>, key_expr: &str, payload: Vec<u8>, attachment: Option<Vec<u8>>) -> Result<()> {
        let mut reply = self
            .0
            .reply(key_expr.to_string(), payload)
            .encoding(Encoding::APPLICATION_CDR);
        if let Some(attachment) = attachment {
            reply = reply.attachment(attachment);
        }
        Ok(reply.wait()?)
    }

    fn reply_err(self: Box<Self>, payload: Vec<u8>) -> Result<()> {
        Ok(self.0.reply_err(payload).wait()?)
    }
}

impl Transport for ZenohTransport {
    fn session_id(&self) -> String {
        self.session.zid().to_string()
    }

    fn declare_publisher(&self, key_expr: &str, qos: &QosProfile) -> Result<Box<dyn PublisherHandle>> {
        // Reliable blocks on congestion, best effort drops.
        let congestion_control = match qos.reliability {
            QosReliability::Reliable => CongestionControl::Block,
            QosReliability::BestEffort => CongestionControl::Drop,
        };
        let publisher = self
            .session
            .declare_publisher(key_expr.to_string())
            .encoding(Encoding::APPLICATION_CDR)
            .congestion_control(congestion_control)
            .wait()?;
        Ok(Box::new(ZenohPublisher(publisher)))
    }

    fn declare_subscriber(&self, key_expr: &str, callback: SampleCallback) -> Result<Box<dyn Undeclare>> {
        let subscriber = self
            .session
            .declare_subscriber(key_expr.to_string())
            .callback(move |sample: Sample| callback(to_sample(&sample)))
            .wait()?;
        Ok(Box::new(ZenohSubscriber(subscriber)))
    }

    fn declare_queryable(&self, key_expr: &str, callback: QueryCallback) -> Result<Box<dyn Undeclare>> {
        let queryable = self
            .session
            .declare_queryable(key_expr.to_string())
            .complete(true)
            .callback(move |query: Query| {
                let key_expr = query.key_expr().to_string();
                let payload = query.payload().map(to_vec);
                let attachment = query.attachment().map(to_vec);
                callback(TransportQuery::new(
                    key_expr,
                    payload,
                    attachment,
                    Box::new(ZenohResponder(query)),
                ));
            })
            .wait()?;
        Ok(Box::new(ZenohQueryable(queryable)))
    }

    fn get(
        &self,
        key_expr: &str,
        payload: Vec<u8>,
        attachment: Vec<u8>,
        timeout: Duration,
        callback: ReplyCallback,
    ) -> Result<()> {
        self.session
            .get(key_expr.to_string())
            .payload(payload)
            .attachment(attachment)
            .target(QueryTarget::AllComplete)
            .consolidation(ConsolidationMode::None)
            .timeout(timeout)
            .callback(move |reply: Reply| {
                let reply = match reply.result() {
                    Ok(sample) => TransportReply::Ok(to_sample(sample)),
                    Err(err) => TransportReply::Err(to_vec(err.payload())),
                };
                callback(reply);
            })
            .wait()?;
        Ok(())
    }

    fn declare_token(&self, key_expr: &str) -> Result<Box<dyn Undeclare>> {
        let token = self
            .session
            .liveliness()
            .declare_token(key_expr.to_string())
            .wait()?;
        Ok(Box::new(ZenohToken(token)))
    }

    fn declare_liveliness_subscriber(
        &self,
        key_expr: &str,
        history: bool,
        callback: LivelinessCallback,
    ) -> Result<Box<dyn Undeclare>> {
        let subscriber = self
            .session
            .liveliness()
            .declare_subscriber(key_expr.to_string())
            .history(history)
            .callback(move |sample: Sample| {
                let key_expr = sample.key_expr().to_string();
                callback(match sample.kind() {
                    SampleKind::Put => LivelinessEvent::Put(key_expr),
                    SampleKind::Delete => LivelinessEvent::Delete(key_expr),
                });
            })
            .wait()?;
        Ok(Box::new(ZenohSubscriber(subscriber)))
    }

    fn close(&self) -> Result<()> {
        Ok(self.session.close().wait()?)
    }
}
