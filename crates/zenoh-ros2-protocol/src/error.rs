//! Error types for QoS strings, names and liveliness tokens

pub type Result<T> = std::result::Result<T, TokenError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QosError {
    #[error("invalid QoS string '{input}': {reason}")]
    InvalidQosString { input: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("malformed liveliness token '{token}': {reason}")]
    MalformedToken { token: String, reason: String },

    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error(transparent)]
    Qos(#[from] QosError),
}
