//! Wi-Fi and broker link management.
//!
//! Two state machines with the same contract shape — `Disconnected →
//! Connecting → Connected`, any state to `Failed(reason)` — one for the
//! Wi-Fi association, one for the broker session on top of it. Reconnects
//! are gated by a bounded exponential backoff so a dead link is not
//! hammered, and every connect/publish step has an explicit timeout so a
//! network outage can never starve the watchdog.
//!
//! The manager owns no counters: it returns classified errors and the
//! caller routes them through the status aggregator.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Broker session keep-alive, sized for a device that publishes every ~30 s.
const KEEP_ALIVE: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WifiError {
    #[error("wifi association failed: {0}")]
    Associate(String),
    #[error("wifi connect timed out")]
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("broker connect failed: {0}")]
    Connect(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("broker operation timed out")]
    Timeout,
    #[error("no broker session")]
    NotConnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("wifi: {0}")]
    Wifi(WifiError),
    #[error("broker: {0}")]
    Broker(BrokerError),
    #[error("publish transport: {0}")]
    Publish(BrokerError),
    /// A reconnect is owed but the backoff window is still open. No attempt
    /// was made, so callers must not count this as a new failure.
    #[error("reconnect backoff window still open")]
    RetryPending,
}

// ---------------------------------------------------------------------------
// Link state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Failed(String),
}

/// Bounded exponential backoff between reconnect attempts.
#[derive(Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    not_before: Option<Duration>,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
            not_before: None,
        }
    }

    /// True when a new attempt is allowed at monotonic time `now`.
    pub fn ready(&self, now: Duration) -> bool {
        self.not_before.map_or(true, |t| now >= t)
    }

    /// Record a failed attempt: schedule the next one after the current
    /// delay, then double the delay up to the bound.
    pub fn record_failure(&mut self, now: Duration) {
        self.not_before = Some(now + self.current);
        self.current = (self.current * 2).min(self.max);
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
        self.not_before = None;
    }

    pub fn current_delay(&self) -> Duration {
        self.current
    }
}

/// One link layer: its state, when it last changed, and its retry gate.
struct LinkMachine {
    name: &'static str,
    state: LinkState,
    since: Duration,
    backoff: Backoff,
}

impl LinkMachine {
    fn new(name: &'static str, backoff: Backoff) -> Self {
        Self {
            name,
            state: LinkState::Disconnected,
            since: Duration::ZERO,
            backoff,
        }
    }

    fn set(&mut self, now: Duration, next: LinkState) {
        if self.state != next {
            debug!(
                link = self.name,
                from = ?self.state,
                to = ?next,
                after_secs = now.saturating_sub(self.since).as_secs(),
                "link transition"
            );
            self.state = next;
            self.since = now;
        }
    }
}

// ---------------------------------------------------------------------------
// Capability interfaces
// ---------------------------------------------------------------------------

pub trait WifiLink {
    /// Cheap, bounded liveness check of an association believed healthy.
    async fn is_up(&mut self) -> bool;
    /// Bounded association attempt.
    async fn connect(&mut self) -> Result<(), WifiError>;
}

pub trait BrokerClient {
    async fn connect(&mut self) -> Result<(), BrokerError>;
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError>;
    fn disconnect(&mut self);
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct NetworkManager<L: WifiLink, B: BrokerClient> {
    link: L,
    client: B,
    wifi: LinkMachine,
    broker: LinkMachine,
}

impl<L: WifiLink, B: BrokerClient> NetworkManager<L, B> {
    pub fn new(link: L, client: B, backoff_initial: Duration, backoff_max: Duration) -> Self {
        Self {
            link,
            client,
            wifi: LinkMachine::new("wifi", Backoff::new(backoff_initial, backoff_max)),
            broker: LinkMachine::new("broker", Backoff::new(backoff_initial, backoff_max)),
        }
    }

    pub fn wifi_state(&self) -> &LinkState {
        &self.wifi.state
    }

    pub fn broker_state(&self) -> &LinkState {
        &self.broker.state
    }

    /// Fully connected means both layers are up. A Wi-Fi-up/broker-down
    /// split is not connected.
    pub fn is_connected(&self) -> bool {
        self.wifi.state == LinkState::Connected && self.broker.state == LinkState::Connected
    }

    /// Bring both layers up, best effort. Used at boot and by callers that
    /// want to re-establish the link outside a publish.
    pub async fn connect(&mut self, now: Duration) -> Result<(), PublishError> {
        self.ensure_wifi(now).await?;
        self.ensure_broker(now).await
    }

    /// Publish one payload, reconnecting both layers first if needed. Each
    /// step is bounded; on transport failure the broker machine is demoted
    /// for the next cycle instead of retrying inline.
    pub async fn publish(
        &mut self,
        now: Duration,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), PublishError> {
        self.ensure_wifi(now).await?;
        self.ensure_broker(now).await?;

        match self.client.publish(topic, payload).await {
            Ok(()) => {
                debug!(topic, bytes = payload.len(), "published");
                Ok(())
            }
            Err(e) => {
                warn!(topic, "publish failed: {e}");
                self.client.disconnect();
                self.broker.set(now, LinkState::Disconnected);
                Err(PublishError::Publish(e))
            }
        }
    }

    /// Drop both links. Used by the memory-pressure recovery path; the next
    /// publish re-establishes them from scratch.
    pub fn shutdown(&mut self, now: Duration) {
        self.client.disconnect();
        self.broker.set(now, LinkState::Disconnected);
        self.wifi.set(now, LinkState::Disconnected);
        info!("network links dropped");
    }

    async fn ensure_wifi(&mut self, now: Duration) -> Result<(), PublishError> {
        if self.wifi.state == LinkState::Connected {
            if self.link.is_up().await {
                return Ok(());
            }
            // Association silently died underneath us.
            warn!("wifi link lost");
            self.wifi.set(now, LinkState::Disconnected);
            self.broker.set(now, LinkState::Disconnected);
            self.client.disconnect();
        }

        if !self.wifi.backoff.ready(now) {
            return Err(PublishError::RetryPending);
        }

        self.wifi.set(now, LinkState::Connecting);
        match self.link.connect().await {
            Ok(()) => {
                info!("wifi connected");
                self.wifi.set(now, LinkState::Connected);
                self.wifi.backoff.reset();
                Ok(())
            }
            Err(e) => {
                warn!(
                    retry_in_secs = self.wifi.backoff.current_delay().as_secs(),
                    "wifi connect failed: {e}"
                );
                self.wifi.backoff.record_failure(now);
                self.wifi.set(now, LinkState::Failed(e.to_string()));
                Err(PublishError::Wifi(e))
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    #[cfg(test)]
    pub(crate) fn client_mut(&mut self) -> &mut B {
        &mut self.client
    }

    async fn ensure_broker(&mut self, now: Duration) -> Result<(), PublishError> {
        if self.broker.state == LinkState::Connected {
            return Ok(());
        }

        if !self.broker.backoff.ready(now) {
            return Err(PublishError::RetryPending);
        }

        self.broker.set(now, LinkState::Connecting);
        match self.client.connect().await {
            Ok(()) => {
                info!("broker connected");
                self.broker.set(now, LinkState::Connected);
                self.broker.backoff.reset();
                Ok(())
            }
            Err(e) => {
                warn!(
                    retry_in_secs = self.broker.backoff.current_delay().as_secs(),
                    "broker connect failed: {e}"
                );
                self.broker.backoff.record_failure(now);
                self.broker.set(now, LinkState::Failed(e.to_string()));
                Err(PublishError::Broker(e))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Production Wi-Fi link
// ---------------------------------------------------------------------------

/// Wi-Fi link whose association is owned by the operating system. The
/// monitor cannot re-associate itself; what it can do is verify the link is
/// actually usable with a bounded TCP probe toward the broker host.
pub struct SystemWifi {
    ssid: String,
    probe_addr: String,
    timeout: Duration,
}

impl SystemWifi {
    pub fn new(ssid: impl Into<String>, probe_addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ssid: ssid.into(),
            probe_addr: probe_addr.into(),
            timeout,
        }
    }

    async fn probe(&self) -> Result<(), WifiError> {
        match tokio::time::timeout(self.timeout, tokio::net::TcpStream::connect(&self.probe_addr))
            .await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(WifiError::Associate(format!(
                "probe of {} failed: {e}",
                self.probe_addr
            ))),
            Err(_) => Err(WifiError::Timeout),
        }
    }
}

impl WifiLink for SystemWifi {
    async fn is_up(&mut self) -> bool {
        self.probe().await.is_ok()
    }

    async fn connect(&mut self) -> Result<(), WifiError> {
        debug!(ssid = %self.ssid, "verifying wifi link");
        self.probe().await
    }
}

// ---------------------------------------------------------------------------
// Production broker client
// ---------------------------------------------------------------------------

/// rumqttc-backed broker session. The event loop is driven inline, bounded
/// by the configured timeouts, so the single-threaded supervisor keeps
/// control of how long any network step may take.
pub struct RumqttcBroker {
    host: String,
    port: u16,
    client_id: String,
    connect_timeout: Duration,
    publish_timeout: Duration,
    conn: Option<(AsyncClient, EventLoop)>,
}

impl RumqttcBroker {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        client_id: impl Into<String>,
        connect_timeout: Duration,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: client_id.into(),
            connect_timeout,
            publish_timeout,
            conn: None,
        }
    }
}

impl BrokerClient for RumqttcBroker {
    async fn connect(&mut self) -> Result<(), BrokerError> {
        self.disconnect();

        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(KEEP_ALIVE);
        let (client, mut eventloop) = AsyncClient::new(options, 20);

        let wait = tokio::time::timeout(self.connect_timeout, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                    Ok(_) => {}
                    Err(e) => return Err(BrokerError::Connect(e.to_string())),
                }
            }
        })
        .await;

        match wait {
            Ok(Ok(())) => {
                self.conn = Some((client, eventloop));
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(BrokerError::Timeout),
        }
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let Some((client, eventloop)) = self.conn.as_mut() else {
            return Err(BrokerError::NotConnected);
        };

        client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;

        // Drive the event loop until the broker acks, so transport failures
        // surface here rather than rotting in the request queue.
        let wait = tokio::time::timeout(self.publish_timeout, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::PubAck(_))) => return Ok(()),
                    Ok(_) => {}
                    Err(e) => return Err(BrokerError::Publish(e.to_string())),
                }
            }
        })
        .await;

        match wait {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Timeout),
        }
    }

    fn disconnect(&mut self) {
        if let Some((client, _)) = self.conn.take() {
            let _ = client.try_disconnect();
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
