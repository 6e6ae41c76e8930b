//! CDR (Common Data Representation) encoding for ROS 2 over Zenoh.
//!
//! The crate provides two levels of API:
//!
//! 1. **Low-level primitives** (`CdrWriter`, `CdrReader`): byte-level
//!    operations with CDR alignment handling.
//!
//! 2. **Schema-driven codec** (`encode`, `decode`): converts a [`WireMessage`]
//!    to and from a complete payload, using a resolved
//!    [`zenoh_ros2_schema::TypeDescriptor`] as the layout.

mod codec;
mod error;
mod primitives;
mod value;

pub use byteorder::LittleEndian;
pub use codec::{decode, encode, CDR_HEADER_LE};
pub use error::{CdrError, Result};
pub use primitives::{CdrReader, CdrWriter};
pub use value::{WireMessage, WireValue};
