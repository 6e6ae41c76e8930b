//! # zenoh-ros2-sdk: talk to ROS 2 over Zenoh without a ROS 2 install
//!
//! Nodes, publishers, subscribers, service servers and clients that are wire
//! compatible with `rmw_zenoh`. Message types are described by their `.msg` /
//! `.srv` text at runtime and carried as [`WireMessage`] values.
//!
//! ## Getting started
//!
//! ```rust,ignore
//! use zenoh_ros2_sdk::prelude::*;
//!
//! let ctx = ZContextBuilder::default().with_domain_id(0).build()?;
//! let node = ctx.create_node("talker").build()?;
//! let publisher = node.create_pub("/chatter", "std_msgs/msg/String").build()?;
//! publisher.publish(&WireMessage::new().with("data", "Hello World!"))?;
//! ```
//!
//! ## Blocking and async
//!
//! Receiving operations come in a blocking form and an `_async` form, e.g.
//! [`ZSub::recv`] and [`ZSub::recv_async`]. The async forms work on any
//! executor.
//!
//! ## Transports
//!
//! Contexts open a Zenoh session by default. Tests and embedders can pass a
//! [`transport::MemoryTransport`] to
//! [`ZContextBuilder::with_transport`] instead.

pub mod attachment;
pub mod context;
pub mod error;
pub mod graph;
pub mod node;
pub mod prelude;
pub mod pubsub;
pub mod service;
pub mod transport;

pub use attachment::{Attachment, CorrelationKey, GidArray};
pub use context::{ZContext, ZContextBuilder};
pub use error::{Error, Result};
pub use graph::Graph;
pub use node::{ZNode, ZNodeBuilder};
pub use pubsub::{ReceivedMessage, ZPub, ZPubBuilder, ZSub, ZSubBuilder};
pub use service::{
    PendingResponse, ServiceRequest, ZClient, ZClientBuilder, ZServer, ZServerBuilder,
};

pub use zenoh_ros2_cdr::{WireMessage, WireValue};
pub use zenoh_ros2_protocol::{QosHistory, QosProfile};
pub use zenoh_ros2_schema::{TypeHash, TypeRegistry, TypeResolver};

/// Builds a configured object, consuming the builder.
///
/// Bring it into scope (or use the [`prelude`]) to call `.build()`.
pub trait Builder {
    /// The type produced by this builder.
    type Output;
    /// Consume the builder and construct the configured object.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a declaration on
    /// the transport fails.
    fn build(self) -> Result<Self::Output>;
}
