//! Error taxonomy shared by the simulator core and its collaborators.

use thiserror::Error;

/// Invalid simulator configuration. Always fatal, and always raised before
/// any broker connection is attempted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("minimum value must be non-negative (got {min})")]
    NegativeMinimum { min: i64 },

    #[error("minimum value {min} must be below maximum value {max}")]
    InvalidBounds { min: i64, max: i64 },

    #[error("{name} must be in (0, 1] (got {value})")]
    FractionOutOfRange { name: &'static str, value: f64 },

    #[error("{name} must be in [0, 1] (got {value})")]
    WalkFraction { name: &'static str, value: f64 },

    #[error("interval must be greater than zero")]
    ZeroInterval,

    #[error("publish timeout must be greater than zero")]
    ZeroPublishTimeout,

    #[error("qos must be 0, 1 or 2 (got {0})")]
    InvalidQos(u8),

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("topic {0:?} must not contain wildcards")]
    WildcardTopic(String),

    #[error("invalid broker address: {0}")]
    BrokerAddress(String),
}

/// Failure to establish the broker session.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("broker refused connection: {0}")]
    Refused(String),

    #[error("no connection acknowledgement within {secs}s")]
    Timeout { secs: u64 },

    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to hand a message to the publish collaborator.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish request rejected: {0}")]
    Rejected(String),

    #[error("publish I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to tear down the broker session.
#[derive(Debug, Error)]
pub enum DisconnectError {
    #[error("disconnect request rejected: {0}")]
    Rejected(String),

    #[error("disconnect I/O error: {0}")]
    Io(#[from] std::io::Error),
}
