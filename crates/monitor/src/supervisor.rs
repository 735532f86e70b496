//! The top-level cooperative scheduling loop.
//!
//! One logical thread of control: each iteration multiplexes sensor
//! acquisition, display refresh, data publication, health reporting and
//! memory maintenance by comparing monotonic time against named interval
//! timers, then feeds the watchdog exactly once at iteration end. Every
//! recoverable error is caught where it happens, classified, counted and
//! logged — nothing propagates out of an iteration. Only the preventive
//! reset timer, a memory emergency, or the hardware watchdog itself can end
//! the loop.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::clock::{Clock, IntervalTimer};
use crate::config::Config;
use crate::display::{DisplayController, DisplaySurface};
use crate::logger::{EventLogger, Severity};
use crate::mem::{classify, MemoryProbe, MemoryThresholds, Pressure};
use crate::net::{BrokerClient, NetworkManager, PublishError, WifiLink};
use crate::payload::{Co2Payload, SensorPayload, TOPIC_CO2, TOPIC_SENSOR, TOPIC_STATUS};
use crate::sensor::{Co2Driver, SensorReader};
use crate::state::SystemState;
use crate::status::{Outcome, StatusAggregator};
use crate::watchdog::{Watchdog, WatchdogSupervisor};

/// Pause between loop iterations.
const LOOP_PAUSE: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Device lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Booting,
    Running,
    /// Terminal until the process is restarted from outside.
    Rebooting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootReason {
    PreventiveReset,
    MemoryEmergency,
}

impl fmt::Display for RebootReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreventiveReset => write!(f, "preventive reset interval elapsed"),
            Self::MemoryEmergency => write!(f, "memory emergency"),
        }
    }
}

// ---------------------------------------------------------------------------
// Interval timers
// ---------------------------------------------------------------------------

struct Timers {
    sensor: IntervalTimer,
    display: IntervalTimer,
    publish: IntervalTimer,
    report: IntervalTimer,
    maintenance: IntervalTimer,
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

pub struct Supervisor<C, S, D, W, L, B, M>
where
    C: Clock,
    S: Co2Driver,
    D: DisplaySurface,
    W: Watchdog,
    L: WifiLink,
    B: BrokerClient,
    M: MemoryProbe,
{
    device_id: String,
    reader: SensorReader<S>,
    display: DisplayController<D>,
    net: NetworkManager<L, B>,
    agg: StatusAggregator,
    watchdog: WatchdogSupervisor<W>,
    memory: M,
    thresholds: MemoryThresholds,
    logger: EventLogger,
    state: SystemState,
    phase: Phase,
    timers: Timers,
    clock: C,
}

impl<C, S, D, W, L, B, M> Supervisor<C, S, D, W, L, B, M>
where
    C: Clock,
    S: Co2Driver,
    D: DisplaySurface,
    W: Watchdog,
    L: WifiLink,
    B: BrokerClient,
    M: MemoryProbe,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: &Config,
        clock: C,
        driver: S,
        surface: D,
        wifi: L,
        broker: B,
        dog: W,
        memory: M,
        logger: EventLogger,
    ) -> Self {
        let now = clock.monotonic();
        let t = &cfg.timing;
        Self {
            device_id: cfg.network.device_id.clone(),
            reader: SensorReader::new(driver),
            display: DisplayController::new(surface),
            net: NetworkManager::new(wifi, broker, t.backoff_initial(), t.backoff_max()),
            agg: StatusAggregator::new(cfg.network.device_id.clone()),
            watchdog: WatchdogSupervisor::new(dog, t.preventive_reset()),
            memory,
            thresholds: cfg.memory.thresholds(),
            logger,
            state: SystemState::new(),
            phase: Phase::Booting,
            timers: Timers {
                // The first reading should land as soon as the loop starts;
                // publication and reporting wait one full period.
                sensor: IntervalTimer::immediate(t.sensor_read()),
                display: IntervalTimer::immediate(t.display_switch()),
                publish: IntervalTimer::after(t.publish(), now),
                report: IntervalTimer::after(t.report(), now),
                maintenance: IntervalTimer::after(t.maintenance(), now),
            },
            clock,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &SystemState {
        &self.state
    }

    #[cfg(test)]
    pub(crate) fn net_mut(&mut self) -> &mut NetworkManager<L, B> {
        &mut self.net
    }

    /// Best-effort bring-up. A device in a closet with no operator must
    /// come up in whatever degraded mode the hardware allows, so nothing
    /// here is fatal.
    pub async fn boot(&mut self) {
        info!(device_id = %self.device_id, "monitor starting");
        self.logger
            .append(self.clock.wall_unix(), Severity::Info, "monitor starting");

        let free = self.memory.free_bytes();
        debug!(free_bytes = free, "initial memory estimate");
        self.watchdog.service();

        let now = self.clock.monotonic();
        match self.net.connect(now).await {
            Ok(()) => {
                self.logger
                    .append(self.clock.wall_unix(), Severity::Info, "network connected");
            }
            Err(e) => {
                self.classify_net_error(e, "startup connect");
                self.logger.append(
                    self.clock.wall_unix(),
                    Severity::Warning,
                    "network unavailable — starting in offline mode",
                );
            }
        }
        self.watchdog.service();

        self.phase = Phase::Running;
        self.logger
            .append(self.clock.wall_unix(), Severity::Info, "monitoring started");
        info!("monitoring started");
    }

    /// Drive the loop until a reboot is requested.
    pub async fn run(&mut self) -> RebootReason {
        self.boot().await;
        loop {
            if let Some(reason) = self.tick().await {
                return reason;
            }
            tokio::time::sleep(LOOP_PAUSE).await;
        }
    }

    /// One loop iteration. Within it, the sensor refresh always precedes
    /// any publish that uses its value.
    pub async fn tick(&mut self) -> Option<RebootReason> {
        let now = self.clock.monotonic();

        if self.timers.sensor.due(now) {
            self.read_sensor();
        }
        if self.timers.display.due(now) {
            self.refresh_display();
        }
        if self.timers.publish.due(now) {
            self.publish_data(now).await;
        }
        if self.timers.report.due(now) {
            self.publish_report(now).await;
        }

        let mut reboot = None;
        if self.timers.maintenance.due(now) {
            reboot = self.maintenance(now);
        }
        if reboot.is_none() && self.watchdog.preventive_reset_due(now) {
            reboot = Some(RebootReason::PreventiveReset);
        }
        if let Some(reason) = reboot {
            self.request_reboot(reason, now);
        }

        // Iteration complete. The only place the watchdog is ever fed.
        self.watchdog.service();
        reboot
    }

    // -- Steps ---------------------------------------------------------------

    fn read_sensor(&mut self) {
        let ts = self.clock.wall_unix();
        match self.reader.acquire(ts) {
            Ok(reading) => {
                debug!(co2 = reading.co2, thi = reading.thi, "sensor reading");
                self.agg.record(&mut self.state, Outcome::ReadOk);
                self.state.last_reading = Some(reading);
            }
            Err(e) => {
                warn!("sensor read failed: {e}");
                self.agg.record(&mut self.state, Outcome::ReadFailed);
                self.logger
                    .append(ts, Severity::Error, &format!("sensor read failed: {e}"));
            }
        }
    }

    fn refresh_display(&mut self) {
        if let Err(e) = self.display.refresh(self.state.last_reading.as_ref()) {
            // Non-fatal; the next interval retries naturally.
            warn!("display refresh failed: {e}");
            self.logger.append(
                self.clock.wall_unix(),
                Severity::Warning,
                &format!("display refresh failed: {e}"),
            );
        }
    }

    async fn publish_data(&mut self, now: Duration) {
        let Some(reading) = self.state.last_reading.clone() else {
            // A publish interval elapsed with nothing to send. The gap is
            // counted so consumers can see it in the next health report.
            debug!("publish skipped: no reading yet");
            self.agg.record(&mut self.state, Outcome::PublishSkipped);
            return;
        };

        let Some(co2) = encode(&Co2Payload::from_reading(&reading)) else {
            return;
        };
        if let Err(e) = self.net.publish(now, TOPIC_CO2, &co2).await {
            self.classify_net_error(e, TOPIC_CO2);
            return;
        }

        let Some(data) = encode(&SensorPayload::from_reading(&reading, &self.device_id)) else {
            return;
        };
        match self.net.publish(now, TOPIC_SENSOR, &data).await {
            Ok(()) => {
                debug!(co2 = reading.co2, "data published");
                self.agg.record(&mut self.state, Outcome::PublishOk);
            }
            Err(e) => self.classify_net_error(e, TOPIC_SENSOR),
        }
    }

    async fn publish_report(&mut self, now: Duration) {
        let free = self.memory.free_bytes();
        let report = self
            .agg
            .snapshot(&self.state, now, free, self.clock.wall_unix());
        let Some(bytes) = encode(&report) else {
            return;
        };
        match self.net.publish(now, TOPIC_STATUS, &bytes).await {
            Ok(()) => info!(uptime = report.uptime, "health report published"),
            Err(e) => self.classify_net_error(e, TOPIC_STATUS),
        }
    }

    fn maintenance(&mut self, now: Duration) -> Option<RebootReason> {
        let free = self.memory.free_bytes();
        match classify(free, &self.thresholds) {
            Pressure::Normal => {
                debug!(free_bytes = free, "memory ok");
            }
            Pressure::Warning => {
                warn!(free_bytes = free, "memory low");
                self.logger.append(
                    self.clock.wall_unix(),
                    Severity::Warning,
                    &format!("MEMORY_WARNING: {free}"),
                );
            }
            Pressure::Critical => {
                // Dropping the network stack releases its buffers; the next
                // publish rebuilds both links from scratch.
                warn!(free_bytes = free, "memory critical — dropping network links");
                self.logger.append(
                    self.clock.wall_unix(),
                    Severity::Warning,
                    &format!("MEMORY_CRITICAL: {free}"),
                );
                self.net.shutdown(now);
            }
            Pressure::Emergency => {
                self.logger.append(
                    self.clock.wall_unix(),
                    Severity::Critical,
                    &format!("EMERGENCY_RESET: memory={free}"),
                );
                return Some(RebootReason::MemoryEmergency);
            }
        }
        None
    }

    // -- Error routing -------------------------------------------------------

    /// Route a classified network error into the counters and the device
    /// log. `RetryPending` means no attempt was made — logged at debug,
    /// never counted, so counters move once per real attempt rather than
    /// once per loop iteration.
    fn classify_net_error(&mut self, err: PublishError, context: &str) {
        let ts = self.clock.wall_unix();
        match &err {
            PublishError::RetryPending => {
                debug!(context, "publish deferred: {err}");
            }
            PublishError::Wifi(_) => {
                self.agg.record(&mut self.state, Outcome::WifiFailed);
                self.logger
                    .append(ts, Severity::Error, &format!("{context}: {err}"));
            }
            PublishError::Broker(_) => {
                self.agg.record(&mut self.state, Outcome::BrokerFailed);
                self.logger
                    .append(ts, Severity::Error, &format!("{context}: {err}"));
            }
            PublishError::Publish(_) => {
                self.agg.record(&mut self.state, Outcome::PublishFailed);
                self.logger
                    .append(ts, Severity::Error, &format!("{context}: {err}"));
            }
        }
    }

    fn request_reboot(&mut self, reason: RebootReason, now: Duration) {
        self.phase = Phase::Rebooting;
        let ts = self.clock.wall_unix();
        let severity = match reason {
            RebootReason::PreventiveReset => Severity::Info,
            RebootReason::MemoryEmergency => Severity::Critical,
        };
        self.logger
            .append(ts, severity, &format!("reboot requested: {reason}"));
        self.logger.append(
            ts,
            Severity::Info,
            &format!(
                "uptime: {}s, readings: {}, transmissions: {}",
                now.as_secs(),
                self.state.successful_readings,
                self.state.successful_transmissions
            ),
        );
        warn!(%reason, "rebooting");
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Option<Vec<u8>> {
    match serde_json::to_vec(value) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!("payload encoding failed: {e}");
            None
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
