//! 4-character numeric display control.
//!
//! The physical driver (TM1637-class, bit-banged clock/data) sits behind
//! `DisplaySurface`; this module only decides *what* the four characters
//! show. Until the first reading ever succeeds the surface shows the
//! startup placeholder — never zeroed or stale sensor data.

use thiserror::Error;

use crate::state::SensorReading;

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// What the 4-character surface shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// Fixed placeholder shown until the first successful reading.
    Startup,
    /// Bare CO2 value in ppm.
    Co2(u32),
    /// "Hi" prefix plus the rounded comfort index.
    ComfortIndex(i64),
}

impl Frame {
    /// Text for the 4-character surface. Values are clamped to what four
    /// digits can carry rather than overflowing the panel.
    pub fn text(&self) -> String {
        match self {
            Self::Startup => "init".to_string(),
            Self::Co2(ppm) => format!("{}", (*ppm).min(9999)),
            Self::ComfortIndex(v) => format!("Hi{:02}", (*v).clamp(0, 99)),
        }
    }
}

// ---------------------------------------------------------------------------
// Surface capability
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisplayError {
    #[error("display render failed: {0}")]
    Render(String),
}

pub trait DisplaySurface {
    fn render(&mut self, frame: Frame) -> Result<(), DisplayError>;
}

/// Logs frames instead of driving hardware. Stands in for the panel during
/// development and on hosts without the display wired up.
pub struct ConsoleDisplay;

impl DisplaySurface for ConsoleDisplay {
    fn render(&mut self, frame: Frame) -> Result<(), DisplayError> {
        tracing::info!(target: "display", frame = %frame.text(), "render");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Alternates the CO2 and comfort-index frames on the display cadence.
pub struct DisplayController<D: DisplaySurface> {
    surface: D,
    show_co2: bool,
}

impl<D: DisplaySurface> DisplayController<D> {
    pub fn new(surface: D) -> Self {
        Self {
            surface,
            show_co2: true,
        }
    }

    /// Render the next frame in the alternation, or the startup placeholder
    /// while no reading exists yet. The alternation only advances once real
    /// data is on the panel.
    pub fn refresh(&mut self, reading: Option<&SensorReading>) -> Result<(), DisplayError> {
        let frame = match reading {
            None => Frame::Startup,
            Some(r) => {
                let frame = if self.show_co2 {
                    Frame::Co2(r.co2)
                } else {
                    Frame::ComfortIndex(r.thi.round() as i64)
                };
                self.show_co2 = !self.show_co2;
                frame
            }
        };
        self.surface.render(frame)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
