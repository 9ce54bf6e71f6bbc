use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use telemetry_core::{LoopSnapshot, SnapshotExchange};
use telemetry_io::metrics::{
    init_metrics, serve_metrics, BROKER_CONNECTED, CONNECT_FAILURES, DELIVERIES_CONFIRMED,
    DELIVERY_TIMEOUTS, LAST_TIMESTAMP_MS, LAST_VALUE, PUBLISH_ERRORS, PUBLISH_LATENCY_US, TICKS,
};
use tracing::info;

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(
    addr: &str,
    exchange: Arc<SnapshotExchange>,
) -> thread::JoinHandle<()> {
    info!(addr = %addr, "Starting metrics server");
    serve_metrics(addr.to_string(), exchange)
}

/// Mirror loop snapshots into the Prometheus registry every 200 ms. Does one
/// final pass after `stop` is raised so the shutdown state is exported.
pub fn start_metrics_updater(
    exchange: Arc<SnapshotExchange>,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut seen = LoopSnapshot::default();
        loop {
            let stopping = stop.load(Ordering::Acquire);
            let snapshot = exchange.read();
            apply_snapshot(&seen, &snapshot);
            seen = snapshot;
            if stopping {
                break;
            }
            thread::sleep(Duration::from_millis(200));
        }
    })
}

fn apply_snapshot(prev: &LoopSnapshot, next: &LoopSnapshot) {
    TICKS.inc_by(next.ticks.saturating_sub(prev.ticks));
    DELIVERIES_CONFIRMED.inc_by(next.confirmed.saturating_sub(prev.confirmed));
    DELIVERY_TIMEOUTS.inc_by(next.delivery_timeouts.saturating_sub(prev.delivery_timeouts));
    PUBLISH_ERRORS.inc_by(next.publish_errors.saturating_sub(prev.publish_errors));
    CONNECT_FAILURES.inc_by(next.connect_failures.saturating_sub(prev.connect_failures));
    if next.ticks > prev.ticks {
        PUBLISH_LATENCY_US.observe(next.last_publish_us as f64);
    }
    BROKER_CONNECTED.set(if next.connected { 1.0 } else { 0.0 });
    LAST_VALUE.set(next.last_value as f64);
    LAST_TIMESTAMP_MS.set(next.last_timestamp_ms as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_core::LoopState;

    #[test]
    fn counters_advance_by_snapshot_delta() {
        init();
        let ticks_before = TICKS.get();
        let timeouts_before = DELIVERY_TIMEOUTS.get();

        let first = LoopSnapshot {
            state: LoopState::Running,
            connected: true,
            ticks: 4,
            delivery_timeouts: 1,
            last_value: 321,
            last_timestamp_ms: 1_700_000_000_000,
            ..Default::default()
        };
        let second = LoopSnapshot {
            ticks: 6,
            delivery_timeouts: 2,
            last_value: 330,
            ..first
        };
        apply_snapshot(&LoopSnapshot::default(), &first);
        apply_snapshot(&first, &second);

        assert_eq!(TICKS.get() - ticks_before, 6);
        assert_eq!(DELIVERY_TIMEOUTS.get() - timeouts_before, 2);
        assert_eq!(LAST_VALUE.get(), 330.0);
        assert_eq!(BROKER_CONNECTED.get(), 1.0);
    }
}
