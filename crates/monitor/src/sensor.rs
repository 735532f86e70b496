//! One-shot sensor acquisition and the derived comfort index.
//!
//! `SensorReader` wraps a single attempt against the driver, validates the
//! raw values and computes the temperature-humidity index. It is stateless
//! and does no logging or counting — classifying the outcome is the caller's
//! job, which keeps this component trivially testable.

use thiserror::Error;

use crate::state::SensorReading;

/// Highest CO2 concentration the sensor family can plausibly report.
/// Anything outside `0..=CO2_MAX_PPM` is treated as a corrupted read.
pub const CO2_MAX_PPM: i64 = 50_000;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("sensor has no fresh measurement")]
    NotReady,
    #[error("sensor read timed out")]
    Timeout,
    #[error("malformed reading: {0}")]
    Malformed(String),
    #[error("sensor bus error: {0}")]
    Bus(String),
}

// ---------------------------------------------------------------------------
// Driver capability
// ---------------------------------------------------------------------------

/// Raw values as the driver reports them, before validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub co2: i64,
    pub temperature: f64,
    pub humidity: f64,
}

/// Capability interface over the physical CO2/temperature/humidity driver.
/// The I2C framing behind it is an external collaborator; one call is one
/// bounded acquisition attempt.
pub trait Co2Driver {
    fn sample(&mut self) -> Result<RawSample, SensorError>;
}

// ---------------------------------------------------------------------------
// Comfort index
// ---------------------------------------------------------------------------

/// Temperature-humidity discomfort index, rounded to one decimal.
///
/// Coefficients are calibrated against the reference device's published
/// readings (24.5 °C / 55.2 %rh → 71.6); treat the formula as a fixed
/// constant set, not something to re-derive.
pub fn comfort_index(temperature: f64, humidity: f64) -> f64 {
    let thi = 0.81 * temperature + 0.01 * humidity * (0.99 * temperature - 14.3) + 46.3;
    (thi * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

pub struct SensorReader<D: Co2Driver> {
    driver: D,
}

impl<D: Co2Driver> SensorReader<D> {
    pub fn new(driver: D) -> Self {
        Self { driver }
    }

    /// One acquisition attempt. On failure the caller's prior reading is
    /// untouched — a failed attempt never produces a partial reading.
    pub fn acquire(&mut self, timestamp: i64) -> Result<SensorReading, SensorError> {
        let raw = self.driver.sample()?;

        if !(0..=CO2_MAX_PPM).contains(&raw.co2) {
            return Err(SensorError::Malformed(format!(
                "co2 {} ppm out of range 0..={CO2_MAX_PPM}",
                raw.co2
            )));
        }
        if !(0.0..=100.0).contains(&raw.humidity) {
            return Err(SensorError::Malformed(format!(
                "humidity {}% out of range 0..=100",
                raw.humidity
            )));
        }

        Ok(SensorReading {
            co2: raw.co2 as u32,
            temperature: raw.temperature,
            humidity: raw.humidity,
            thi: comfort_index(raw.temperature, raw.humidity),
            timestamp,
        })
    }
}

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

/// Pre-configured simulation profiles, selectable from the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Hovers near typical indoor air. Low noise, no injected failures.
    Stable,
    /// Slow upward CO2 drift, as in an occupied unventilated room.
    Drifting,
    /// Noisy values plus injected NotReady/bus failures. Exercises the
    /// supervisor's retry and last-known-good paths.
    Flaky,
}

impl Scenario {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "drifting" => Self::Drifting,
            "flaky" => Self::Flaky,
            _ => Self::Stable, // default
        }
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stable => write!(f, "stable"),
            Self::Drifting => write!(f, "drifting"),
            Self::Flaky => write!(f, "flaky"),
        }
    }
}

// ---------------------------------------------------------------------------
// Simulated driver
// ---------------------------------------------------------------------------

/// Stateful simulator producing plausible indoor-air readings.
///
/// Models temporal coherence via a random walk with mean reversion, plus
/// per-reading noise and (in the flaky scenario) occasional acquisition
/// failures, so long soak runs behave like a real sensor rather than white
/// noise.
pub struct SimCo2Driver {
    co2: f64,
    temperature: f64,
    humidity: f64,

    co2_center: f64,
    drift_per_sample: f64,
    walk_sigma: f64,
    mean_reversion: f64,
    failure_prob: f32,
}

impl SimCo2Driver {
    pub fn new(scenario: Scenario) -> Self {
        let (center, drift, walk_sigma, mean_rev, failure_prob) = match scenario {
            Scenario::Stable => (650.0, 0.0, 15.0, 0.05, 0.0_f32),
            Scenario::Drifting => (900.0, 4.0, 25.0, 0.01, 0.0),
            Scenario::Flaky => (800.0, 0.0, 120.0, 0.03, 0.15),
        };

        Self {
            co2: center,
            temperature: 22.0,
            humidity: 45.0,
            co2_center: center,
            drift_per_sample: drift,
            walk_sigma,
            mean_reversion: mean_rev,
            failure_prob,
        }
    }

    /// Approximate a sample from N(0,1): sum of 12 uniforms minus 6
    /// (Irwin-Hall), avoiding an extra dependency.
    fn approx_std_normal() -> f64 {
        let mut sum: f64 = 0.0;
        for _ in 0..12 {
            sum += fastrand::f64();
        }
        sum - 6.0
    }

    fn gaussian(mean: f64, sigma: f64) -> f64 {
        mean + sigma * Self::approx_std_normal()
    }
}

impl Co2Driver for SimCo2Driver {
    fn sample(&mut self) -> Result<RawSample, SensorError> {
        if self.failure_prob > 0.0 && fastrand::f32() < self.failure_prob {
            // Alternate between the two failure modes a flaky bus produces.
            return if fastrand::bool() {
                Err(SensorError::NotReady)
            } else {
                Err(SensorError::Bus("i2c read returned garbage".into()))
            };
        }

        // Evolve CO2: drift + mean reversion + random walk.
        let pull = self.mean_reversion * (self.co2_center - self.co2);
        let walk = Self::gaussian(0.0, self.walk_sigma);
        self.co2 = (self.co2 + self.drift_per_sample + pull + walk).clamp(350.0, 10_000.0);

        // Temperature and humidity wander slowly around indoor conditions.
        self.temperature =
            (self.temperature + Self::gaussian(0.0, 0.05)).clamp(10.0, 35.0);
        self.humidity = (self.humidity + Self::gaussian(0.0, 0.3)).clamp(15.0, 85.0);

        Ok(RawSample {
            co2: self.co2.round() as i64,
            temperature: self.temperature,
            humidity: self.humidity,
        })
    }
}

// ===========================================================================
// Tests
// ===========================================================================
