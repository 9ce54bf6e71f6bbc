pub mod broker;
pub mod metrics;
pub mod mqtt;

pub use broker::{BrokerAddress, BrokerAddressError};
pub use metrics::{init_metrics, serve_metrics};
pub use mqtt::{MqttConfig, MqttPublisher};
