//! Scripted fakes shared across the unit tests. Compiled only for tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use crate::clock::Clock;
use crate::display::{DisplayError, DisplaySurface, Frame};
use crate::mem::MemoryProbe;
use crate::net::{BrokerClient, BrokerError, WifiError, WifiLink};
use crate::sensor::{Co2Driver, RawSample, SensorError};
use crate::watchdog::Watchdog;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Manually advanced clock. Clones share the same time, so a test can hold
/// one handle while the supervisor owns another.
#[derive(Clone)]
pub struct FakeClock {
    inner: Rc<Cell<(Duration, i64)>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Cell::new((Duration::ZERO, 1_700_000_000))),
        }
    }

    pub fn advance(&self, d: Duration) {
        let (mono, wall) = self.inner.get();
        self.inner.set((mono + d, wall + d.as_secs() as i64));
    }
}

impl Clock for FakeClock {
    fn monotonic(&self) -> Duration {
        self.inner.get().0
    }

    fn wall_unix(&self) -> i64 {
        self.inner.get().1
    }
}

// ---------------------------------------------------------------------------
// Sensor driver
// ---------------------------------------------------------------------------

/// Driver that replays a scripted sequence of samples and failures, then
/// reports NotReady once the script runs dry.
pub struct ScriptedDriver {
    pub script: VecDeque<Result<RawSample, SensorError>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
        }
    }

    pub fn push_ok(&mut self, co2: i64, temperature: f64, humidity: f64) {
        self.script.push_back(Ok(RawSample {
            co2,
            temperature,
            humidity,
        }));
    }

    pub fn push_err(&mut self, err: SensorError) {
        self.script.push_back(Err(err));
    }
}

impl Co2Driver for ScriptedDriver {
    fn sample(&mut self) -> Result<RawSample, SensorError> {
        self.script.pop_front().unwrap_or(Err(SensorError::NotReady))
    }
}

// ---------------------------------------------------------------------------
// Display surface
// ---------------------------------------------------------------------------

/// Records every rendered frame; clones share the recording, so a test keeps
/// a handle while the controller owns the surface.
#[derive(Clone)]
pub struct SharedDisplay {
    pub frames: Rc<RefCell<Vec<Frame>>>,
    pub fail: Rc<Cell<bool>>,
}

impl SharedDisplay {
    pub fn new() -> Self {
        Self {
            frames: Rc::new(RefCell::new(Vec::new())),
            fail: Rc::new(Cell::new(false)),
        }
    }
}

impl DisplaySurface for SharedDisplay {
    fn render(&mut self, frame: Frame) -> Result<(), DisplayError> {
        if self.fail.get() {
            return Err(DisplayError::Render("segment driver nack".into()));
        }
        self.frames.borrow_mut().push(frame);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Wi-Fi link whose health is a flag: `up` decides both the liveness probe
/// and the default connect result. A script queue can override individual
/// connect attempts.
pub struct FakeWifi {
    pub up: bool,
    pub connect_results: VecDeque<Result<(), WifiError>>,
    pub connect_attempts: usize,
}

impl FakeWifi {
    pub fn healthy() -> Self {
        Self {
            up: true,
            connect_results: VecDeque::new(),
            connect_attempts: 0,
        }
    }

    pub fn down() -> Self {
        Self {
            up: false,
            ..Self::healthy()
        }
    }
}

impl WifiLink for FakeWifi {
    async fn is_up(&mut self) -> bool {
        self.up
    }

    async fn connect(&mut self) -> Result<(), WifiError> {
        self.connect_attempts += 1;
        let result = self.connect_results.pop_front().unwrap_or_else(|| {
            if self.up {
                Ok(())
            } else {
                Err(WifiError::Associate("no association".into()))
            }
        });
        if result.is_ok() {
            self.up = true;
        }
        result
    }
}

/// Broker endpoint with the same flag-plus-script shape as `FakeWifi`.
pub struct FakeBroker {
    pub up: bool,
    pub connected: bool,
    pub connect_results: VecDeque<Result<(), BrokerError>>,
    pub publish_results: VecDeque<Result<(), BrokerError>>,
    pub published: Vec<(String, Vec<u8>)>,
    pub connect_attempts: usize,
    pub publish_attempts: usize,
    pub disconnects: usize,
}

impl FakeBroker {
    pub fn healthy() -> Self {
        Self {
            up: true,
            connected: false,
            connect_results: VecDeque::new(),
            publish_results: VecDeque::new(),
            published: Vec::new(),
            connect_attempts: 0,
            publish_attempts: 0,
            disconnects: 0,
        }
    }

    pub fn down() -> Self {
        Self {
            up: false,
            ..Self::healthy()
        }
    }
}

impl BrokerClient for FakeBroker {
    async fn connect(&mut self) -> Result<(), BrokerError> {
        self.connect_attempts += 1;
        let result = self.connect_results.pop_front().unwrap_or_else(|| {
            if self.up {
                Ok(())
            } else {
                Err(BrokerError::Connect("broker unreachable".into()))
            }
        });
        self.connected = result.is_ok();
        result
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.publish_attempts += 1;
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }
        if let Some(result) = self.publish_results.pop_front() {
            if result.is_ok() {
                self.published.push((topic.to_string(), payload.to_vec()));
            }
            return result;
        }
        if self.up {
            self.published.push((topic.to_string(), payload.to_vec()));
            Ok(())
        } else {
            Err(BrokerError::Publish("connection reset".into()))
        }
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
        self.connected = false;
    }
}

// ---------------------------------------------------------------------------
// Watchdog and memory
// ---------------------------------------------------------------------------

/// Counts feeds through a shared handle.
pub struct FakeDog {
    pub feeds: Rc<Cell<u32>>,
}

impl FakeDog {
    pub fn new() -> (Self, Rc<Cell<u32>>) {
        let feeds = Rc::new(Cell::new(0));
        (
            Self {
                feeds: Rc::clone(&feeds),
            },
            feeds,
        )
    }
}

impl Watchdog for FakeDog {
    fn feed(&mut self) {
        self.feeds.set(self.feeds.get() + 1);
    }
}

/// Memory probe whose reading a test adjusts through a shared handle.
pub struct FakeMemory {
    pub free: Rc<Cell<u64>>,
}

impl FakeMemory {
    pub fn new(free_bytes: u64) -> (Self, Rc<Cell<u64>>) {
        let free = Rc::new(Cell::new(free_bytes));
        (
            Self {
                free: Rc::clone(&free),
            },
            free,
        )
    }
}

impl MemoryProbe for FakeMemory {
    fn free_bytes(&mut self) -> u64 {
        self.free.get()
    }
}
