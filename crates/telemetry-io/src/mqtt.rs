//! MQTT implementation of the [`Publisher`] capability.
//!
//! `rumqttc` is asynchronous; the simulation loop is a plain thread. The
//! publisher owns a small tokio runtime that drives the client event loop in
//! the background and reports what it sees over a channel. Publish calls
//! enqueue without blocking and then wait, bounded, for the matching
//! confirmation event. Nothing is enqueued while the session is down.

use crate::broker::BrokerAddress;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet,
};
use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};
use telemetry_core::{
    ConnectError, DeliveryOutcome, DisconnectError, PublishError, Publisher, QoS,
};
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct MqttConfig {
    pub broker: BrokerAddress,
    pub client_id: String,
    pub keep_alive: Duration,
    /// Bound on every wait for a broker acknowledgement.
    pub confirm_timeout: Duration,
    /// Requests buffered while the broker is unreachable.
    pub request_capacity: usize,
}

impl MqttConfig {
    pub fn new(broker: BrokerAddress, client_id: impl Into<String>) -> Self {
        Self {
            broker,
            client_id: client_id.into(),
            keep_alive: Duration::from_secs(30),
            confirm_timeout: Duration::from_secs(5),
            request_capacity: 64,
        }
    }
}

/// What the background event loop observed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkEvent {
    Connected,
    Refused(String),
    Lost(String),
    Sent(u16),
    Acked(u16),
    Completed(u16),
    Disconnected,
}

/// Session bookkeeping fed by every [`LinkEvent`] the publisher consumes.
#[derive(Debug, Default)]
struct LinkTracker {
    online: bool,
    /// Requests handed to the client that have not been written yet.
    unsent: usize,
    /// Packet ids written and not yet acknowledged.
    inflight: HashSet<u16>,
}

impl LinkTracker {
    fn queued(&mut self) {
        self.unsent += 1;
    }

    /// Returns false for a retransmission of a packet already written, which
    /// must not be taken as the first write of a newer request.
    fn note(&mut self, event: &LinkEvent) -> bool {
        match *event {
            LinkEvent::Connected => self.online = true,
            LinkEvent::Refused(_) | LinkEvent::Lost(_) | LinkEvent::Disconnected => {
                self.online = false
            }
            LinkEvent::Sent(pkid) => {
                // QoS 0 packets all carry id 0 and are never retransmitted.
                if pkid != 0 && !self.inflight.insert(pkid) {
                    return false;
                }
                self.unsent = self.unsent.saturating_sub(1);
            }
            LinkEvent::Acked(pkid) | LinkEvent::Completed(pkid) => {
                self.inflight.remove(&pkid);
            }
        }
        true
    }
}

/// Follows one publish request through the event stream. The request's own
/// write is the first fresh `Sent` after the `ahead` requests queued before
/// it; acknowledgements are matched on the packet id of that write.
#[derive(Debug)]
struct Delivery {
    qos: QoS,
    ahead: usize,
    pkid: Option<u16>,
}

impl Delivery {
    fn new(qos: QoS, ahead: usize) -> Self {
        Self {
            qos,
            ahead,
            pkid: None,
        }
    }

    /// True once the event confirms this request.
    fn observe(&mut self, event: &LinkEvent) -> bool {
        match *event {
            LinkEvent::Sent(pkid) if self.pkid.is_none() => {
                if self.ahead > 0 {
                    self.ahead -= 1;
                    return false;
                }
                self.pkid = Some(pkid);
                self.qos == QoS::AtMostOnce
            }
            LinkEvent::Acked(pkid) => self.qos == QoS::AtLeastOnce && self.pkid == Some(pkid),
            LinkEvent::Completed(pkid) => self.qos == QoS::ExactlyOnce && self.pkid == Some(pkid),
            _ => false,
        }
    }
}

pub struct MqttPublisher {
    config: MqttConfig,
    client: AsyncClient,
    eventloop: Option<EventLoop>,
    events_tx: Sender<LinkEvent>,
    events: Receiver<LinkEvent>,
    link: LinkTracker,
    poller: Option<JoinHandle<()>>,
    runtime: Runtime,
}

impl MqttPublisher {
    pub fn new(config: MqttConfig) -> std::io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("mqtt-client")
            .enable_all()
            .build()?;

        let mut options = MqttOptions::new(
            config.client_id.clone(),
            config.broker.host.clone(),
            config.broker.port,
        );
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(true);

        let (client, eventloop) = {
            let _guard = runtime.enter();
            AsyncClient::new(options, config.request_capacity)
        };
        let (events_tx, events) = mpsc::channel();

        Ok(Self {
            config,
            client,
            eventloop: Some(eventloop),
            events_tx,
            events,
            link: LinkTracker::default(),
            poller: None,
            runtime,
        })
    }

    /// Consume link events until `accept` yields or `timeout` elapses.
    /// Every event updates the link state, whether accepted or not.
    fn wait_for<T>(
        &mut self,
        timeout: Duration,
        mut accept: impl FnMut(&LinkEvent) -> Option<T>,
    ) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(event) => {
                    if !self.link.note(&event) {
                        debug!(?event, "Ignoring retransmission");
                        continue;
                    }
                    if let Some(done) = accept(&event) {
                        return Some(done);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None
                }
            }
        }
    }

    /// Apply events that arrived since the last call.
    fn refresh_link(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.link.note(&event);
        }
    }
}

impl Publisher for MqttPublisher {
    fn connect(&mut self) -> Result<(), ConnectError> {
        let Some(eventloop) = self.eventloop.take() else {
            return Ok(());
        };
        info!(broker = %self.config.broker, client_id = %self.config.client_id, "Connecting to broker");
        self.poller = Some(
            self.runtime
                .spawn(drive_event_loop(eventloop, self.events_tx.clone())),
        );

        let outcome = self.wait_for(self.config.confirm_timeout, |event| match event {
            LinkEvent::Connected => Some(Ok(())),
            LinkEvent::Refused(reason) => Some(Err(ConnectError::Refused(reason.clone()))),
            _ => None,
        });
        outcome.unwrap_or(Err(ConnectError::Timeout {
            secs: self.config.confirm_timeout.as_secs(),
        }))
    }

    fn disconnect(&mut self) -> Result<(), DisconnectError> {
        let Some(poller) = self.poller.take() else {
            return Ok(());
        };
        let requested = self
            .client
            .try_disconnect()
            .map_err(|e| DisconnectError::Rejected(e.to_string()));
        if requested.is_ok() {
            let flushed = self.wait_for(self.config.confirm_timeout, |event| {
                (*event == LinkEvent::Disconnected).then_some(())
            });
            if flushed.is_none() {
                warn!("Broker disconnect not flushed before timeout");
            }
        }
        poller.abort();
        self.link.online = false;
        requested
    }

    fn is_connected(&self) -> bool {
        self.link.online
    }

    /// Readings produced while the session is down are not queued: they
    /// report a delivery timeout straight away, so nothing stale is sent
    /// once the broker comes back.
    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retained: bool,
    ) -> Result<DeliveryOutcome, PublishError> {
        self.refresh_link();
        if !self.link.online {
            debug!(topic, "Broker offline, reading not queued");
            return Ok(DeliveryOutcome::TimedOut);
        }

        let ahead = self.link.unsent;
        self.client
            .try_publish(topic, to_mqtt_qos(qos), retained, payload.to_vec())
            .map_err(|e| PublishError::Rejected(e.to_string()))?;
        self.link.queued();

        let mut delivery = Delivery::new(qos, ahead);
        let confirmed = self.wait_for(self.config.confirm_timeout, |event| {
            delivery.observe(event).then_some(())
        });

        Ok(match confirmed {
            Some(()) => DeliveryOutcome::Confirmed,
            None => DeliveryOutcome::TimedOut,
        })
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

fn to_mqtt_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

fn classify(event: &Event) -> Option<LinkEvent> {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) if ack.code == ConnectReturnCode::Success => {
            Some(LinkEvent::Connected)
        }
        Event::Incoming(Packet::ConnAck(ack)) => Some(LinkEvent::Refused(format!("{:?}", ack.code))),
        Event::Incoming(Packet::PubAck(ack)) => Some(LinkEvent::Acked(ack.pkid)),
        Event::Incoming(Packet::PubComp(comp)) => Some(LinkEvent::Completed(comp.pkid)),
        Event::Outgoing(Outgoing::Publish(pkid)) => Some(LinkEvent::Sent(*pkid)),
        Event::Outgoing(Outgoing::Disconnect) => Some(LinkEvent::Disconnected),
        _ => None,
    }
}

/// Polls the client event loop until a disconnect goes out or the publisher
/// is dropped. Errors are retried every second; `rumqttc` reconnects on the
/// next poll.
async fn drive_event_loop(mut eventloop: EventLoop, events: Sender<LinkEvent>) {
    let mut online = false;
    loop {
        let link_event = match eventloop.poll().await {
            Ok(event) => {
                let link_event = classify(&event);
                match &link_event {
                    Some(LinkEvent::Connected) => {
                        online = true;
                        info!("Connected to broker");
                    }
                    Some(LinkEvent::Refused(code)) => warn!(code = %code, "Broker refused connection"),
                    _ => {}
                }
                link_event
            }
            Err(e) => {
                let reason = e.to_string();
                let link_event = if online {
                    online = false;
                    warn!(error = %reason, "Connection lost");
                    LinkEvent::Lost(reason)
                } else {
                    debug!(error = %reason, "Broker unreachable");
                    LinkEvent::Refused(reason)
                };
                if events.send(link_event).is_err() {
                    return;
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        if let Some(link_event) = link_event {
            let done = link_event == LinkEvent::Disconnected;
            if events.send(link_event).is_err() || done {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, PubAck};

    #[test]
    fn classifies_acknowledgements() {
        let ack = Event::Incoming(Packet::ConnAck(ConnAck::new(ConnectReturnCode::Success, false)));
        assert_eq!(classify(&ack), Some(LinkEvent::Connected));

        let refused = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::NotAuthorized,
            false,
        )));
        assert!(matches!(classify(&refused), Some(LinkEvent::Refused(_))));

        let puback = Event::Incoming(Packet::PubAck(PubAck::new(7)));
        assert_eq!(classify(&puback), Some(LinkEvent::Acked(7)));

        assert_eq!(
            classify(&Event::Outgoing(Outgoing::Publish(7))),
            Some(LinkEvent::Sent(7))
        );
        assert_eq!(classify(&Event::Outgoing(Outgoing::PingReq)), None);
    }

    #[test]
    fn maps_qos_levels() {
        assert_eq!(to_mqtt_qos(QoS::AtMostOnce), rumqttc::QoS::AtMostOnce);
        assert_eq!(to_mqtt_qos(QoS::ExactlyOnce), rumqttc::QoS::ExactlyOnce);
    }

    /// Queue `backlog` earlier requests, then one more, and replay `events`
    /// through the tracker. Returns the index of the confirming event.
    fn confirming_event(
        link: &mut LinkTracker,
        qos: QoS,
        backlog: usize,
        events: &[LinkEvent],
    ) -> Option<usize> {
        for _ in 0..backlog {
            link.queued();
        }
        let mut delivery = Delivery::new(qos, link.unsent);
        link.queued();
        events
            .iter()
            .position(|event| link.note(event) && delivery.observe(event))
    }

    fn online() -> LinkTracker {
        let mut link = LinkTracker::default();
        link.note(&LinkEvent::Connected);
        link
    }

    #[test]
    fn qos1_confirms_only_its_own_ack_behind_a_backlog() {
        use LinkEvent::*;
        let events = [Sent(1), Acked(1), Sent(2), Acked(2), Sent(3), Acked(3)];
        let confirmed = confirming_event(&mut online(), QoS::AtLeastOnce, 2, &events);
        assert_eq!(confirmed, Some(5));
    }

    #[test]
    fn qos1_ignores_acks_that_arrive_before_its_write() {
        use LinkEvent::*;
        // Ack 4 belongs to a request that timed out earlier.
        let events = [Acked(4), Sent(5), Acked(4), Acked(5)];
        let confirmed = confirming_event(&mut online(), QoS::AtLeastOnce, 0, &events);
        assert_eq!(confirmed, Some(3));
    }

    #[test]
    fn qos0_skips_writes_of_earlier_requests() {
        use LinkEvent::*;
        let events = [Sent(0), Sent(0)];
        let confirmed = confirming_event(&mut online(), QoS::AtMostOnce, 1, &events);
        assert_eq!(confirmed, Some(1));
    }

    #[test]
    fn qos2_waits_for_pubcomp_of_its_packet() {
        use LinkEvent::*;
        let events = [Sent(9), Acked(9), Completed(8), Completed(9)];
        let confirmed = confirming_event(&mut online(), QoS::ExactlyOnce, 0, &events);
        assert_eq!(confirmed, Some(3));
    }

    #[test]
    fn retransmission_after_reconnect_is_not_mistaken_for_new_write() {
        use LinkEvent::*;
        let mut link = online();
        // Packet 5 went out, then the session dropped before its ack.
        link.queued();
        link.note(&Sent(5));
        link.note(&Lost("connection reset".into()));
        assert!(!link.online);

        let events = [Connected, Sent(5), Sent(6), Acked(5), Acked(6)];
        let confirmed = confirming_event(&mut link, QoS::AtLeastOnce, 0, &events);
        assert_eq!(confirmed, Some(4));
        assert!(link.inflight.is_empty());
    }

    #[test]
    fn tracker_follows_session_state() {
        let mut link = LinkTracker::default();
        assert!(!link.online);
        link.note(&LinkEvent::Connected);
        assert!(link.online);
        link.note(&LinkEvent::Lost("io".into()));
        assert!(!link.online);
        link.note(&LinkEvent::Connected);
        link.note(&LinkEvent::Disconnected);
        assert!(!link.online);
    }

    #[test]
    fn unreachable_broker_fails_connect_and_skips_publishing() {
        // Port 1 on localhost is closed on any sane test host.
        let broker: BrokerAddress = "mqtt://127.0.0.1:1".parse().unwrap();
        let mut config = MqttConfig::new(broker, "test-client");
        config.confirm_timeout = Duration::from_secs(3);
        let mut publisher = MqttPublisher::new(config).unwrap();

        assert!(publisher.connect().is_err());
        assert!(!publisher.is_connected());

        let started = Instant::now();
        let outcome = publisher
            .publish("local/sim/test-client", b"1 2", QoS::AtLeastOnce, false)
            .unwrap();
        assert_eq!(outcome, DeliveryOutcome::TimedOut);
        // Offline readings are dropped without waiting out the timeout.
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(publisher.link.unsent, 0);
        publisher.disconnect().ok();
    }
}
