use crate::generator::ValueGenerator;
use crate::publisher::{DeliveryOutcome, Publisher, QoS};
use crate::reading::Reading;
use crate::sync::{LoopSnapshot, LoopState, SnapshotExchange};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct SimulationConfig {
    /// Sleep between two readings.
    pub interval: Duration,
    /// Fully qualified topic, already suffixed with the device id.
    pub topic: String,
    pub qos: QoS,
    pub retained: bool,
}

#[derive(Clone, Default, Debug, PartialEq)]
pub struct ExecutionStats {
    pub ticks: u64,
    pub confirmed: u64,
    pub delivery_timeouts: u64,
    pub publish_errors: u64,
    pub connect_failures: u64,
    pub disconnect_failures: u64,
    pub max_publish_us: u64,
}

/// Drives the generator on a fixed cadence and hands every reading to the
/// publisher.
///
/// The stop flag is checked once per iteration, before a reading is
/// generated. The sleep that follows a publish always runs to completion, so
/// a stop request is honoured at most one interval late and never interrupts
/// a tick halfway.
pub struct SimulationLoop<P: Publisher, R: Rng = StdRng> {
    publisher: P,
    generator: ValueGenerator<R>,
    config: SimulationConfig,
    exchange: Arc<SnapshotExchange>,
    stats: ExecutionStats,
    state: LoopState,
    connected: bool,
    last_reading: Option<Reading>,
    last_publish_us: u64,
}

impl<P: Publisher, R: Rng> SimulationLoop<P, R> {
    pub fn new(
        publisher: P,
        generator: ValueGenerator<R>,
        config: SimulationConfig,
        exchange: Arc<SnapshotExchange>,
        ) -> Self {
        Self {
            publisher,
            generator,
            config,
            exchange,
            stats: ExecutionStats::default(),
            state: LoopState::Created,
            connected: false,
            last_reading: None,
            last_publish_us: 0,
        }
    }

    /// Blocks until `stop` is observed, then disconnects. Connect and
    /// disconnect are each attempted exactly once.
    pub fn run(&mut self, stop: &AtomicBool) {
        self.connect();
        self.transition(LoopState::Running);

        while !stop.load(Ordering::Acquire) {
            self.tick();
            thread::sleep(self.config.interval);
        }

        info!(
            "Stop requested after {} ticks, disconnecting from broker",
            self.stats.ticks
        );
        self.transition(LoopState::Disconnecting);
        self.disconnect();
        self.transition(LoopState::Terminated);
    }

    /// Generate, stamp and publish one reading. Publish failures and
    /// delivery timeouts are recorded and logged, never propagated.
    pub fn tick(&mut self) -> Reading {
        let value = self.generator.generate_next();
        let reading = Reading::now(value);
        let payload = reading.to_payload();

        let started = Instant::now();
        let result = self.publisher.publish(
            &self.config.topic,
            &payload,
            self.config.qos,
            self.config.retained,
        );
        self.last_publish_us = started.elapsed().as_micros() as u64;
        self.stats.max_publish_us = self.stats.max_publish_us.max(self.last_publish_us);

        match result {
            Ok(DeliveryOutcome::Confirmed) => {
                self.stats.confirmed += 1;
                debug!("Delivered {} to {}", reading, self.config.topic);
            }
            Ok(DeliveryOutcome::TimedOut) => {
                self.stats.delivery_timeouts += 1;
                warn!("Message delivery timeout on {}", self.config.topic);
            }
            Err(e) => {
                self.stats.publish_errors += 1;
                warn!("Error in publish to {}: {}", self.config.topic, e);
            }
        }

        self.stats.ticks += 1;
        self.last_reading = Some(reading);
        self.track_link();
        self.publish_snapshot();
        reading
    }

    fn connect(&mut self) {
        match self.publisher.connect() {
            Ok(()) => info!("Connected to broker, publishing to {}", self.config.topic),
            Err(e) => {
                self.stats.connect_failures += 1;
                warn!("Failed to connect to broker: {}", e);
            }
        }
        self.connected = self.publisher.is_connected();
        self.transition(LoopState::Connected);
    }

    fn disconnect(&mut self) {
        match self.publisher.disconnect() {
            Ok(()) => info!("Disconnected from broker"),
            Err(e) => {
                self.stats.disconnect_failures += 1;
                warn!("Failed to disconnect cleanly: {}", e);
            }
        }
        self.connected = self.publisher.is_connected();
    }

    /// Follow link changes the publisher noticed on its own, such as a lost
    /// session or an automatic reconnect.
    fn track_link(&mut self) {
        let connected = self.publisher.is_connected();
        if connected != self.connected {
            if connected {
                info!("Broker link restored");
            } else {
                warn!("Broker link down");
            }
            self.connected = connected;
        }
    }

    fn transition(&mut self, next: LoopState) {
        debug!("Simulation state {:?} -> {:?}", self.state, next);
        self.state = next;
        self.publish_snapshot();
    }

    fn publish_snapshot(&self) {
        let (last_value, last_timestamp_ms) = self
            .last_reading
            .map(|r| (r.value, r.timestamp_ms))
            .unwrap_or((self.generator.last_value(), 0));
        self.exchange.publish(LoopSnapshot {
            state: self.state,
            connected: self.connected,
            ticks: self.stats.ticks,
            confirmed: self.stats.confirmed,
            delivery_timeouts: self.stats.delivery_timeouts,
            publish_errors: self.stats.publish_errors,
            connect_failures: self.stats.connect_failures,
            last_value,
            last_timestamp_ms,
            last_publish_us: self.last_publish_us,
        });
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }
}
