//! Free-memory estimation and pressure classification.
//!
//! The monitor runs for months; the periodic maintenance pass watches the
//! free-memory estimate and escalates through three levels: log a warning,
//! drop the network connections to release their buffers, and finally
//! request a reboot. The thresholds are config tunables.

use sysinfo::System;

// ---------------------------------------------------------------------------
// Pressure levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pressure {
    Normal,
    Warning,
    Critical,
    Emergency,
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryThresholds {
    pub warning_bytes: u64,
    pub critical_bytes: u64,
    pub emergency_bytes: u64,
}

/// Classify a free-memory figure against the configured thresholds.
pub fn classify(free_bytes: u64, t: &MemoryThresholds) -> Pressure {
    if free_bytes < t.emergency_bytes {
        Pressure::Emergency
    } else if free_bytes < t.critical_bytes {
        Pressure::Critical
    } else if free_bytes < t.warning_bytes {
        Pressure::Warning
    } else {
        Pressure::Normal
    }
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

/// Source of the free-memory estimate. A trait so tests can script pressure
/// scenarios without touching the host.
pub trait MemoryProbe {
    fn free_bytes(&mut self) -> u64;
}

/// Production probe backed by the platform statistics.
pub struct SysinfoProbe {
    sys: System,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoProbe {
    fn free_bytes(&mut self) -> u64 {
        self.sys.refresh_memory();
        self.sys.available_memory()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
