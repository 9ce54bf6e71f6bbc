/// Name and description of an exported signal.
#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub metric: &'static str,
    pub help: &'static str,
}

pub const TICKS: Tag = Tag {
    metric: "devicesim_ticks_total",
    help: "Readings generated and handed to the publisher",
};

pub const DELIVERIES_CONFIRMED: Tag = Tag {
    metric: "devicesim_deliveries_confirmed_total",
    help: "Readings whose delivery was confirmed within the timeout",
};

pub const DELIVERY_TIMEOUTS: Tag = Tag {
    metric: "devicesim_delivery_timeouts_total",
    help: "Readings without delivery confirmation before the timeout",
};

pub const PUBLISH_ERRORS: Tag = Tag {
    metric: "devicesim_publish_errors_total",
    help: "Readings the publisher refused to accept",
};

pub const CONNECT_FAILURES: Tag = Tag {
    metric: "devicesim_connect_failures_total",
    help: "Failed broker connection attempts",
};

pub const BROKER_CONNECTED: Tag = Tag {
    metric: "devicesim_broker_connected",
    help: "Broker session status (1=connected, 0=disconnected)",
};

pub const LAST_VALUE: Tag = Tag {
    metric: "devicesim_last_value",
    help: "Most recently published reading",
};

pub const LAST_TIMESTAMP_MS: Tag = Tag {
    metric: "devicesim_last_timestamp_milliseconds",
    help: "Epoch milliseconds of the most recent reading",
};

pub const PUBLISH_LATENCY_US: Tag = Tag {
    metric: "devicesim_publish_latency_microseconds",
    help: "Time spent waiting for delivery confirmation",
};
