use crate::runtime::config::{RuntimeConfig, SimulatorSettings};
use crate::runtime::logging::init_tracing;
use crate::runtime::signals::{spawn_run_timer, spawn_signal_listener};
use crate::runtime::telemetry;
use clap::Parser;
use std::io;
use std::process::ExitCode;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::thread;
use telemetry_core::{
    ConfigError, ConnectError, ConsolePublisher, DeliveryOutcome, DisconnectError, ExecutionStats,
    PublishError, Publisher, QoS, SimulationLoop, SnapshotExchange, ValueGenerator,
};
use telemetry_io::{MqttConfig, MqttPublisher};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to start {what}: {source}")]
    Startup {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("simulation thread panicked")]
    LoopPanicked,
}

impl AppError {
    fn exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) => ExitCode::from(2),
            _ => ExitCode::FAILURE,
        }
    }
}

enum DevicePublisher {
    Mqtt(MqttPublisher),
    Console(ConsolePublisher),
}

impl Publisher for DevicePublisher {
    fn connect(&mut self) -> Result<(), ConnectError> {
        match self {
            Self::Mqtt(p) => p.connect(),
            Self::Console(p) => p.connect(),
        }
    }

    fn disconnect(&mut self) -> Result<(), DisconnectError> {
        match self {
            Self::Mqtt(p) => p.disconnect(),
            Self::Console(p) => p.disconnect(),
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            Self::Mqtt(p) => p.is_connected(),
            Self::Console(p) => p.is_connected(),
        }
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retained: bool,
    ) -> Result<DeliveryOutcome, PublishError> {
        match self {
            Self::Mqtt(p) => p.publish(topic, payload, qos, retained),
            Self::Console(p) => p.publish(topic, payload, qos, retained),
        }
    }
}

pub fn run_from_args() -> ExitCode {
    run(RuntimeConfig::parse())
}

pub fn run(config: RuntimeConfig) -> ExitCode {
    let _log_guard = match init_tracing(config.json_logs, config.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    match start(&config) {
        Ok(stats) => {
            info!(
                ticks = stats.ticks,
                confirmed = stats.confirmed,
                delivery_timeouts = stats.delivery_timeouts,
                publish_errors = stats.publish_errors,
                connect_failures = stats.connect_failures,
                max_publish_us = stats.max_publish_us,
                "Run complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Device simulator stopped");
            e.exit_code()
        }
    }
}

fn start(config: &RuntimeConfig) -> Result<ExecutionStats, AppError> {
    // Validation happens before any publisher exists, so a bad
    // configuration never reaches the broker.
    let settings = config.validate()?;
    let publisher = build_publisher(&settings, config.stdout)?;

    let exchange = Arc::new(SnapshotExchange::new());
    let stop = Arc::new(AtomicBool::new(false));

    let metrics_handles = config.metrics_addr.as_deref().map(|addr| {
        telemetry::init();
        (
            telemetry::start_metrics_server(addr, Arc::clone(&exchange)),
            telemetry::start_metrics_updater(Arc::clone(&exchange), Arc::clone(&stop)),
        )
    });

    let signal_handle = spawn_signal_listener(Arc::clone(&stop)).map_err(|source| {
        AppError::Startup {
            what: "signal listener",
            source,
        }
    })?;
    let timer_handle = config.run_seconds.map(|seconds| {
        info!(seconds, "Running for limited duration");
        spawn_run_timer(seconds, Arc::clone(&stop))
    });

    let stats = simulate(settings, publisher, Arc::clone(&exchange), Arc::clone(&stop));

    // Release helper threads regardless of how the loop ended.
    stop.store(true, Ordering::Release);
    let _ = signal_handle.join();
    if let Some(handle) = timer_handle {
        let _ = handle.join();
    }
    if let Some((_server, updater)) = metrics_handles {
        let _ = updater.join();
    }

    stats
}

fn build_publisher(settings: &SimulatorSettings, stdout: bool) -> Result<DevicePublisher, AppError> {
    if stdout {
        info!("Printing readings to stdout");
        return Ok(DevicePublisher::Console(ConsolePublisher::stdout()));
    }
    let mut mqtt = MqttConfig::new(settings.broker.clone(), settings.device_id.clone());
    mqtt.confirm_timeout = settings.publish_timeout;
    MqttPublisher::new(mqtt)
        .map(DevicePublisher::Mqtt)
        .map_err(|source| AppError::Startup {
            what: "MQTT client runtime",
            source,
        })
}

fn simulate(
    settings: SimulatorSettings,
    publisher: DevicePublisher,
    exchange: Arc<SnapshotExchange>,
    stop: Arc<AtomicBool>,
) -> Result<ExecutionStats, AppError> {
    let generator = match settings.seed {
        Some(seed) => ValueGenerator::seeded(settings.limits, seed)?,
        None => ValueGenerator::from_entropy(settings.limits)?,
    };

    info!(
        device_id = %settings.device_id,
        broker = %settings.broker,
        topic = %settings.simulation.topic,
        interval_s = settings.simulation.interval.as_secs(),
        min = settings.limits.min,
        max = settings.limits.max,
        variation = settings.limits.variation,
        start_fraction = settings.limits.start_fraction,
        first_value = generator.last_value(),
        "Starting device simulator"
    );

    let simulation = settings.simulation;
    let handle = thread::Builder::new()
        .name("sim-loop".into())
        .spawn(move || {
            let mut sim = SimulationLoop::new(publisher, generator, simulation, exchange);
            sim.run(&stop);
            sim.stats().clone()
        })
        .map_err(|source| AppError::Startup {
            what: "simulation thread",
            source,
        })?;

    handle.join().map_err(|_| AppError::LoopPanicked)
}
