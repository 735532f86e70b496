//! Outcome classification and health-report assembly.
//!
//! The aggregator is the sole writer of the `SystemState` counters: every
//! other component returns a classified result and the supervisor routes it
//! through `record`, so counter invariants live in exactly one place.

use std::time::Duration;

use crate::payload::StatusPayload;
use crate::state::SystemState;

// ---------------------------------------------------------------------------
// Classified outcomes
// ---------------------------------------------------------------------------

/// Everything the loop can observe that moves a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    ReadOk,
    ReadFailed,
    PublishOk,
    /// Transport failure while publishing on an established link.
    PublishFailed,
    /// Wi-Fi association attempt failed.
    WifiFailed,
    /// Broker connect attempt failed.
    BrokerFailed,
    /// A publish interval elapsed with no reading to send.
    PublishSkipped,
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

pub struct StatusAggregator {
    device_id: String,
}

impl StatusAggregator {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
        }
    }

    /// Apply one classified outcome to the counters.
    pub fn record(&self, state: &mut SystemState, outcome: Outcome) {
        match outcome {
            Outcome::ReadOk => state.successful_readings += 1,
            Outcome::ReadFailed => state.sensor_errors += 1,
            Outcome::PublishOk => state.successful_transmissions += 1,
            Outcome::PublishFailed | Outcome::BrokerFailed | Outcome::PublishSkipped => {
                state.mqtt_errors += 1
            }
            Outcome::WifiFailed => state.wifi_errors += 1,
        }
        tracing::debug!(?outcome, "outcome recorded");
    }

    /// Point-in-time health snapshot for the `system_status` topic.
    pub fn snapshot(
        &self,
        state: &SystemState,
        uptime: Duration,
        memory_free: u64,
        timestamp: i64,
    ) -> StatusPayload {
        StatusPayload {
            uptime: uptime.as_secs(),
            memory_free,
            successful_readings: state.successful_readings,
            successful_transmissions: state.successful_transmissions,
            sensor_errors: state.sensor_errors,
            mqtt_errors: state.mqtt_errors,
            wifi_errors: state.wifi_errors,
            timestamp,
            device_id: self.device_id.clone(),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_map_to_their_counters() {
        let agg = StatusAggregator::new("dev");
        let mut st = SystemState::new();

        agg.record(&mut st, Outcome::ReadOk);
        agg.record(&mut st, Outcome::ReadFailed);
        agg.record(&mut st, Outcome::PublishOk);
        agg.record(&mut st, Outcome::PublishFailed);
        agg.record(&mut st, Outcome::WifiFailed);
        agg.record(&mut st, Outcome::BrokerFailed);
        agg.record(&mut st, Outcome::PublishSkipped);

        assert_eq!(st.successful_readings, 1);
        assert_eq!(st.sensor_errors, 1);
        assert_eq!(st.successful_transmissions, 1);
        assert_eq!(st.mqtt_errors, 3);
        assert_eq!(st.wifi_errors, 1);
    }

    #[test]
    fn counters_never_decrease() {
        let agg = StatusAggregator::new("dev");
        let mut st = SystemState::new();
        let mut prev = (0, 0, 0, 0, 0);

        let outcomes = [
            Outcome::ReadFailed,
            Outcome::ReadOk,
            Outcome::WifiFailed,
            Outcome::PublishOk,
            Outcome::BrokerFailed,
            Outcome::ReadOk,
            Outcome::PublishFailed,
        ];
        for o in outcomes {
            agg.record(&mut st, o);
            let cur = (
                st.successful_readings,
                st.successful_transmissions,
                st.sensor_errors,
                st.mqtt_errors,
                st.wifi_errors,
            );
            assert!(cur.0 >= prev.0 && cur.1 >= prev.1 && cur.2 >= prev.2);
            assert!(cur.3 >= prev.3 && cur.4 >= prev.4);
            prev = cur;
        }
    }

    #[test]
    fn snapshot_copies_counters_and_identity() {
        let agg = StatusAggregator::new("living-room");
        let mut st = SystemState::new();
        agg.record(&mut st, Outcome::ReadOk);
        agg.record(&mut st, Outcome::ReadOk);
        agg.record(&mut st, Outcome::ReadFailed);

        let report = agg.snapshot(&st, Duration::from_secs(7200), 42_000_000, 1_700_007_200);

        assert_eq!(report.uptime, 7200);
        assert_eq!(report.memory_free, 42_000_000);
        assert_eq!(report.successful_readings, 2);
        assert_eq!(report.sensor_errors, 1);
        assert_eq!(report.timestamp, 1_700_007_200);
        assert_eq!(report.device_id, "living-room");
    }

    #[test]
    fn snapshot_does_not_mutate_state() {
        let agg = StatusAggregator::new("dev");
        let mut st = SystemState::new();
        agg.record(&mut st, Outcome::ReadOk);

        let _ = agg.snapshot(&st, Duration::from_secs(1), 0, 0);
        let _ = agg.snapshot(&st, Duration::from_secs(2), 0, 0);

        assert_eq!(st.successful_readings, 1);
    }
}
