use crate::error::{ConfigError, ConnectError, DisconnectError, PublishError};
use serde::Serialize;

/// Delivery guarantee requested from the broker. Opaque to the core; it is
/// only forwarded to the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum QoS {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for QoS {
    type Error = ConfigError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(ConfigError::InvalidQos(other)),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

/// Result of one bounded wait for delivery confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Confirmed,
    /// The wait elapsed without confirmation. Degraded, not fatal.
    TimedOut,
}

/// Pub/sub capability consumed by the simulation loop.
///
/// `publish` must return within the implementation's confirmation timeout.
pub trait Publisher: Send {
    fn connect(&mut self) -> Result<(), ConnectError>;
    fn disconnect(&mut self) -> Result<(), DisconnectError>;
    /// Last known state of the session, as of the most recent call.
    fn is_connected(&self) -> bool;
    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retained: bool,
    ) -> Result<DeliveryOutcome, PublishError>;
}
