//! Prometheus metrics for the device simulator.
//!
//! Counters mirror the loop's execution statistics; gauges expose the last
//! reading and the broker session status.

use prometheus::{Encoder, Gauge, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::{Arc, LazyLock};
use std::thread;
use telemetry_core::tags::{self, Tag};
use telemetry_core::SnapshotExchange;
use tiny_http::{Header, Request, Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

fn counter(tag: Tag) -> IntCounter {
    let counter = IntCounter::new(tag.metric, tag.help).unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
}

fn gauge(tag: Tag) -> Gauge {
    let gauge = Gauge::new(tag.metric, tag.help).unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
}

// ============================================================================
// Loop Metrics
// ============================================================================

pub static TICKS: LazyLock<IntCounter> = LazyLock::new(|| counter(tags::TICKS));

pub static DELIVERIES_CONFIRMED: LazyLock<IntCounter> =
    LazyLock::new(|| counter(tags::DELIVERIES_CONFIRMED));

pub static DELIVERY_TIMEOUTS: LazyLock<IntCounter> =
    LazyLock::new(|| counter(tags::DELIVERY_TIMEOUTS));

pub static PUBLISH_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| counter(tags::PUBLISH_ERRORS));

pub static CONNECT_FAILURES: LazyLock<IntCounter> =
    LazyLock::new(|| counter(tags::CONNECT_FAILURES));

/// Time spent inside publish, confirmation wait included
pub static PUBLISH_LATENCY_US: LazyLock<Histogram> = LazyLock::new(|| {
    let histogram = Histogram::with_opts(
        HistogramOpts::new(tags::PUBLISH_LATENCY_US.metric, tags::PUBLISH_LATENCY_US.help)
            .buckets(vec![
                100.0, 500.0, 1_000.0, 5_000.0, 25_000.0, 100_000.0, 500_000.0, 1_000_000.0,
                5_000_000.0,
            ]),
    )
    .unwrap();
    REGISTRY.register(Box::new(histogram.clone())).unwrap();
    histogram
});

// ============================================================================
// Device State Metrics
// ============================================================================

pub static BROKER_CONNECTED: LazyLock<Gauge> = LazyLock::new(|| gauge(tags::BROKER_CONNECTED));

pub static LAST_VALUE: LazyLock<Gauge> = LazyLock::new(|| gauge(tags::LAST_VALUE));

pub static LAST_TIMESTAMP_MS: LazyLock<Gauge> = LazyLock::new(|| gauge(tags::LAST_TIMESTAMP_MS));

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
///
/// Serves `/metrics`, `/health`, `/ready` (after the first tick) and
/// `/status` (latest loop snapshot as JSON).
pub fn serve_metrics(
    bind_addr: String,
    exchange: Arc<SnapshotExchange>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            handle(request, &exchange);
        }
    })
}

fn handle(request: Request, exchange: &SnapshotExchange) {
    let response = match request.url() {
        "/metrics" => {
            let mut buffer = Vec::new();
            if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
                tracing::warn!("Failed to encode metrics: {}", e);
                Response::from_string("Internal Server Error").with_status_code(500)
            } else {
                Response::from_data(buffer).with_header(content_type("text/plain; version=0.0.4"))
            }
        }
        "/health" => Response::from_string("OK"),
        "/ready" => {
            if TICKS.get() > 0 {
                Response::from_string("Ready")
            } else {
                Response::from_string("Not Ready").with_status_code(503)
            }
        }
        "/status" => match serde_json::to_vec(&exchange.read()) {
            Ok(body) => Response::from_data(body).with_header(content_type("application/json")),
            Err(e) => {
                tracing::warn!("Failed to encode status: {}", e);
                Response::from_string("Internal Server Error").with_status_code(500)
            }
        },
        _ => Response::from_string("Not Found").with_status_code(404),
    };
    let _ = request.respond(response);
}

fn content_type(value: &str) -> Header {
    Header::from_bytes(&b"Content-Type"[..], value.as_bytes())
        .expect("static header is valid")
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = TICKS.get();
    let _ = DELIVERIES_CONFIRMED.get();
    let _ = DELIVERY_TIMEOUTS.get();
    let _ = PUBLISH_ERRORS.get();
    let _ = CONNECT_FAILURES.get();
    let _ = PUBLISH_LATENCY_US.get_sample_count();
    let _ = BROKER_CONNECTED.get();
    let _ = LAST_VALUE.get();
    let _ = LAST_TIMESTAMP_MS.get();
}
