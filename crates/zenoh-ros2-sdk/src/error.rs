//! Error type shared by every entity of the SDK

use zenoh_ros2_cdr::CdrError;
use zenoh_ros2_protocol::{QosError, TokenError};
use zenoh_ros2_schema::SchemaError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Cdr(#[from] CdrError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Qos(#[from] QosError),

    #[error("transport error: {0}")]
    Transport(zenoh::Error),

    #[error("invalid attachment: {0}")]
    Attachment(String),

    #[error("service error: {0}")]
    ServiceError(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0} is closed")]
    Closed(&'static str),

    #[error("built with a callback, no queue available")]
    NoQueue,
}

impl From<zenoh::Error> for Error {
    fn from(e: zenoh::Error) -> Self {
        Error::Transport(e)
    }
}
