//! Common types in one import: `use zenoh_ros2_sdk::prelude::*;`

/// Required to call `.build()` on any builder.
pub use crate::Builder;

pub use crate::context::{ZContext, ZContextBuilder};
pub use crate::error::{Error, Result};

/// QoS configuration types.
pub use zenoh_ros2_protocol::{
    QosDurability, QosHistory, QosLiveliness, QosProfile, QosReliability,
};

/// Dynamic message values.
pub use zenoh_ros2_cdr::{WireMessage, WireValue};

pub use zenoh_ros2_schema::TypeHash;
