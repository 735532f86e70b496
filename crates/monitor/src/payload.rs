//! MQTT topic names and payload shapes.
//!
//! Field names and types are a wire contract with downstream consumers —
//! do not rename or retype anything here without coordinating a migration.

use serde::Serialize;

use crate::state::SensorReading;

pub const TOPIC_CO2: &str = "co2_data";
pub const TOPIC_SENSOR: &str = "sensor_data";
pub const TOPIC_STATUS: &str = "system_status";

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// `co2_data`: the dedicated CO2-only topic.
#[derive(Debug, Serialize)]
pub struct Co2Payload {
    pub co2: u32,
}

impl Co2Payload {
    pub fn from_reading(reading: &SensorReading) -> Self {
        Self { co2: reading.co2 }
    }
}

/// `sensor_data`: the combined per-reading payload.
#[derive(Debug, Serialize)]
pub struct SensorPayload {
    pub timestamp: i64,
    pub device_id: String,
    pub co2: u32,
    pub temperature: f64,
    pub humidity: f64,
    pub thi: f64,
}

impl SensorPayload {
    pub fn from_reading(reading: &SensorReading, device_id: &str) -> Self {
        Self {
            timestamp: reading.timestamp,
            device_id: device_id.to_string(),
            co2: reading.co2,
            temperature: round2(reading.temperature),
            humidity: round2(reading.humidity),
            thi: round2(reading.thi),
        }
    }
}

/// `system_status`: the periodic health report.
#[derive(Debug, Serialize)]
pub struct StatusPayload {
    pub uptime: u64,
    pub memory_free: u64,
    pub successful_readings: u64,
    pub successful_transmissions: u64,
    pub sensor_errors: u64,
    pub mqtt_errors: u64,
    pub wifi_errors: u64,
    pub timestamp: i64,
    pub device_id: String,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

// ===========================================================================
// Tests
// ===========================================================================
