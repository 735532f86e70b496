// ---------------------------------------------------------------------------
// Process-lifetime state
// ---------------------------------------------------------------------------

/// One successful sensor acquisition. Immutable once created; a newer reading
/// replaces it wholesale, it is never patched in place.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// CO2 concentration in parts per million.
    pub co2: u32,
    /// Temperature in °C.
    pub temperature: f64,
    /// Relative humidity in percent (0–100).
    pub humidity: f64,
    /// Derived temperature-humidity comfort index.
    pub thi: f64,
    /// Wall-clock unix seconds at acquisition.
    pub timestamp: i64,
}

/// Counters and the last known good reading, owned exclusively by the
/// supervisor loop. Counters only ever go up within one boot session; a
/// reboot is the only reset.
///
/// Only `StatusAggregator::record` writes the counters — components that
/// merely classify outcomes hand them to the aggregator instead of mutating
/// this struct themselves.
#[derive(Debug, Default)]
pub struct SystemState {
    pub successful_readings: u64,
    pub successful_transmissions: u64,
    pub sensor_errors: u64,
    pub mqtt_errors: u64,
    pub wifi_errors: u64,
    pub last_reading: Option<SensorReading>,
}

impl SystemState {
    pub fn new() -> Self {
        Self::default()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
