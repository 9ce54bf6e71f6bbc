pub mod console;
pub mod error;
pub mod generator;
pub mod publisher;
pub mod reading;
pub mod simulation;
pub mod sync;
pub mod tags;

pub use console::ConsolePublisher;
pub use error::{ConfigError, ConnectError, DisconnectError, PublishError};
pub use generator::{ValueGenerator, WalkLimits};
pub use publisher::{DeliveryOutcome, Publisher, QoS};
pub use reading::{device_topic, unix_millis, Reading};
pub use simulation::{ExecutionStats, SimulationConfig, SimulationLoop};
pub use sync::{LoopSnapshot, LoopState, SnapshotExchange};
