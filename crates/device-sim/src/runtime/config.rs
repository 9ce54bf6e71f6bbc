use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use telemetry_core::{device_topic, ConfigError, QoS, SimulationConfig, WalkLimits};
use telemetry_io::BrokerAddress;
use uuid::Uuid;

const EXAMPLES: &str = "\
EXAMPLES:
    # Values between 100 and 1000 every second
    device-sim --min 100 --max 1000 --interval 1

    # Reproducible walk printed to stdout, no broker needed
    device-sim --stdout --seed 42 --run-seconds 10

    # Production run with JSON logs and metrics
    device-sim --broker-address mqtt://broker:1883 --json-logs --metrics-addr 0.0.0.0:9090

NOTES:
    --var-percentage is the largest relative change between consecutive values.
    --start caps the first value as a fraction of --max.
    Press Ctrl+C to stop the simulator.";

/// Command line and environment configuration.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "device-sim",
    version,
    about = "Simulated telemetry device publishing a bounded random walk over MQTT",
    after_help = EXAMPLES
)]
pub struct RuntimeConfig {
    /// Minimum value
    #[arg(long, env = "DEVICE_SIM_MIN", default_value_t = 1, allow_negative_numbers = true)]
    pub min: i64,

    /// Maximum value
    #[arg(long, env = "DEVICE_SIM_MAX", default_value_t = 200_000, allow_negative_numbers = true)]
    pub max: i64,

    /// Maximum relative change between consecutive values, in (0, 1]
    #[arg(long = "var-percentage", env = "DEVICE_SIM_VAR_PERCENTAGE", default_value_t = 0.05)]
    pub variation: f64,

    /// Cap on the first value as a fraction of --max, in (0, 1]
    #[arg(long = "start", env = "DEVICE_SIM_START", default_value_t = 0.5)]
    pub start_fraction: f64,

    /// Seconds between readings
    #[arg(long, env = "DEVICE_SIM_INTERVAL", default_value_t = 2)]
    pub interval: u64,

    /// Device id, used as MQTT client id and topic suffix [default: SIM-<random uuid>]
    #[arg(long, env = "DEVICE_SIM_ID")]
    pub id: Option<String>,

    /// Broker URL (mqtt:// or tcp://)
    #[arg(long, env = "DEVICE_SIM_BROKER_ADDRESS", default_value = "mqtt://127.0.0.1:1883")]
    pub broker_address: String,

    /// Base topic; readings go to <topic>/<id>
    #[arg(long, env = "DEVICE_SIM_TOPIC", default_value = "local/sim")]
    pub topic: String,

    /// MQTT quality of service (0, 1 or 2)
    #[arg(long, env = "DEVICE_SIM_QOS", default_value_t = 0)]
    pub qos: u8,

    /// Publish readings with the retain flag
    #[arg(long)]
    pub retained: bool,

    /// Seconds to wait for delivery confirmation of each reading
    #[arg(long = "publish-timeout", env = "DEVICE_SIM_PUBLISH_TIMEOUT", default_value_t = 5)]
    pub publish_timeout_secs: u64,

    /// Seed for a reproducible walk
    #[arg(long, env = "DEVICE_SIM_SEED")]
    pub seed: Option<u64>,

    /// Print readings to stdout instead of publishing to a broker
    #[arg(long)]
    pub stdout: bool,

    /// Stop after this many seconds
    #[arg(long)]
    pub run_seconds: Option<u64>,

    /// Output logs in JSON format (for log aggregation)
    #[arg(long)]
    pub json_logs: bool,

    /// Also write daily rolling log files into this directory
    #[arg(long, env = "DEVICE_SIM_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Serve Prometheus metrics on this address (e.g. 0.0.0.0:9090)
    #[arg(long, env = "DEVICE_SIM_METRICS_ADDR")]
    pub metrics_addr: Option<String>,
}

/// Validated settings the simulator is built from.
#[derive(Debug, Clone)]
pub struct SimulatorSettings {
    pub device_id: String,
    pub limits: WalkLimits,
    pub simulation: SimulationConfig,
    pub broker: BrokerAddress,
    pub publish_timeout: Duration,
    pub seed: Option<u64>,
}

impl RuntimeConfig {
    /// Semantic checks clap cannot express. Nothing here touches the network.
    pub fn validate(&self) -> Result<SimulatorSettings, ConfigError> {
        if self.min < 0 {
            return Err(ConfigError::NegativeMinimum { min: self.min });
        }
        if self.min >= self.max {
            return Err(ConfigError::InvalidBounds {
                min: self.min,
                max: self.max,
            });
        }
        check_fraction("var-percentage", self.variation)?;
        check_fraction("start", self.start_fraction)?;
        if self.interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.publish_timeout_secs == 0 {
            return Err(ConfigError::ZeroPublishTimeout);
        }
        let qos = QoS::try_from(self.qos)?;

        let device_id = match &self.id {
            Some(id) => id.trim().to_string(),
            None => format!("SIM-{}", Uuid::new_v4()),
        };
        if device_id.is_empty() {
            return Err(ConfigError::Empty("id"));
        }
        let base_topic = self.topic.trim();
        if base_topic.is_empty() {
            return Err(ConfigError::Empty("topic"));
        }
        let topic = device_topic(base_topic, &device_id);
        if topic.contains(['+', '#']) {
            return Err(ConfigError::WildcardTopic(topic));
        }

        let broker = self
            .broker_address
            .parse::<BrokerAddress>()
            .map_err(|e| ConfigError::BrokerAddress(format!("{}: {e}", self.broker_address)))?;

        Ok(SimulatorSettings {
            device_id,
            limits: WalkLimits {
                min: self.min,
                max: self.max,
                variation: self.variation,
                start_fraction: self.start_fraction,
            },
            simulation: SimulationConfig {
                interval: Duration::from_secs(self.interval),
                topic,
                qos,
                retained: self.retained,
            },
            broker,
            publish_timeout: Duration::from_secs(self.publish_timeout_secs),
            seed: self.seed,
        })
    }
}

fn check_fraction(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::FractionOutOfRange { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> RuntimeConfig {
        let argv = std::iter::once("device-sim").chain(args.iter().copied());
        RuntimeConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_match_reference_device() {
        let settings = parse(&[]).validate().unwrap();
        assert_eq!(settings.limits, WalkLimits::default());
        assert_eq!(settings.simulation.interval, Duration::from_secs(2));
        assert_eq!(settings.simulation.qos, QoS::AtMostOnce);
        assert!(!settings.simulation.retained);
        assert_eq!(settings.broker.to_string(), "mqtt://127.0.0.1:1883");
        assert_eq!(settings.publish_timeout, Duration::from_secs(5));
        assert!(settings.device_id.starts_with("SIM-"));
        assert_eq!(
            settings.simulation.topic,
            format!("local/sim/{}", settings.device_id)
        );
    }

    #[test]
    fn explicit_flags_are_applied() {
        let settings = parse(&[
            "--min", "100", "--max", "1000", "--var-percentage", "0.1", "--start", "0.25",
            "--interval", "1", "--id", "dev-7", "--topic", "plant/line1", "--qos", "1",
            "--retained", "--broker-address", "tcp://broker:1884", "--seed", "9",
        ])
        .validate()
        .unwrap();

        assert_eq!(settings.limits.min, 100);
        assert_eq!(settings.limits.max, 1000);
        assert_eq!(settings.limits.variation, 0.1);
        assert_eq!(settings.limits.start_fraction, 0.25);
        assert_eq!(settings.simulation.topic, "plant/line1/dev-7");
        assert_eq!(settings.simulation.qos, QoS::AtLeastOnce);
        assert!(settings.simulation.retained);
        assert_eq!(settings.broker.port, 1884);
        assert_eq!(settings.seed, Some(9));
    }

    #[test]
    fn min_not_below_max_is_rejected() {
        let err = parse(&["--min", "10", "--max", "10"]).validate().unwrap_err();
        assert_eq!(err, ConfigError::InvalidBounds { min: 10, max: 10 });
    }

    #[test]
    fn negative_min_is_rejected() {
        let err = parse(&["--min", "-5"]).validate().unwrap_err();
        assert_eq!(err, ConfigError::NegativeMinimum { min: -5 });
    }

    #[test]
    fn fractions_must_be_in_unit_interval() {
        let err = parse(&["--var-percentage", "0"]).validate().unwrap_err();
        assert!(matches!(err, ConfigError::FractionOutOfRange { name: "var-percentage", .. }));
        let err = parse(&["--start", "1.5"]).validate().unwrap_err();
        assert!(matches!(err, ConfigError::FractionOutOfRange { name: "start", .. }));
    }

    #[test]
    fn rejects_zero_interval_bad_qos_and_wildcards() {
        assert_eq!(
            parse(&["--interval", "0"]).validate().unwrap_err(),
            ConfigError::ZeroInterval
        );
        assert_eq!(
            parse(&["--qos", "3"]).validate().unwrap_err(),
            ConfigError::InvalidQos(3)
        );
        assert!(matches!(
            parse(&["--topic", "local/#"]).validate().unwrap_err(),
            ConfigError::WildcardTopic(_)
        ));
        assert_eq!(
            parse(&["--id", "  "]).validate().unwrap_err(),
            ConfigError::Empty("id")
        );
    }

    #[test]
    fn malformed_broker_address_is_a_config_error() {
        let err = parse(&["--broker-address", "mqtts://broker:8883"])
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::BrokerAddress(_)));
    }

    #[test]
    fn non_numeric_argument_fails_to_parse() {
        let argv = ["device-sim", "--max", "lots"];
        assert!(RuntimeConfig::try_parse_from(argv).is_err());
    }
}
