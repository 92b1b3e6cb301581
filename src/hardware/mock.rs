//! Mock Hardware Implementations
//!
//! Simulated GPIO for testing the ranging engine without a board. Nothing here
//! produces edges by itself: tests inject each transition explicitly and control
//! time through [`ManualClock`], which makes every distance exactly predictable.
//!
//! # Available Mocks
//!
//! - `ManualClock` - clock that only moves when told to
//! - `MockGpio` - lines with failure injection, pulse counting and an event log

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use tokio::sync::watch;

use super::{Clock, EchoLine, EdgeCallback, GpioBackend, TriggerLine};
use crate::ranging::EdgeKind;

// =============================================================================
// ManualClock
// =============================================================================

/// Clock that stands still until `set_us`/`advance_us` is called.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_us: AtomicU64,
}

impl ManualClock {
    /// Clock at t = 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Jump to an absolute time.
    pub fn set_us(&self, now_us: u64) {
        self.now_us.store(now_us, Ordering::SeqCst);
    }

    /// Move forward by `delta_us`.
    pub fn advance_us(&self, delta_us: u64) {
        self.now_us.fetch_add(delta_us, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::SeqCst)
    }
}

// =============================================================================
// MockGpio
// =============================================================================

/// Something that happened to a mock line, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEvent {
    /// Line claimed.
    Acquired(u32),
    /// Trigger driven to a level.
    Level(u32, bool),
    /// Line given back.
    Released(u32),
}

#[derive(Default)]
struct LineState {
    acquired: bool,
    high: bool,
    callback: Option<EdgeCallback>,
}

#[derive(Default)]
struct MockState {
    lines: HashMap<u32, LineState>,
    failing: HashSet<u32>,
    events: Vec<LineEvent>,
}

impl MockState {
    fn claim(&mut self, line: u32) -> Result<&mut LineState> {
        if self.failing.contains(&line) {
            return Err(anyhow!("GPIO {} is busy", line));
        }
        let state = self.lines.entry(line).or_default();
        if state.acquired {
            return Err(anyhow!("GPIO {} already requested", line));
        }
        state.acquired = true;
        self.events.push(LineEvent::Acquired(line));
        self.lines
            .get_mut(&line)
            .ok_or_else(|| anyhow!("GPIO {} vanished", line))
    }

    fn release(&mut self, line: u32) {
        if let Some(state) = self.lines.get_mut(&line) {
            state.acquired = false;
            state.callback = None;
        }
        self.events.push(LineEvent::Released(line));
    }
}

/// In-memory GPIO backend.
///
/// Clones share the same lines, so a test can keep one handle while the engine owns
/// another.
///
/// # Example
///
/// ```rust,ignore
/// let gpio = MockGpio::new();
/// engine.start(Arc::new(gpio.clone()), gpio.clock())?;
/// gpio.wait_for_pulses(1).await;
/// gpio.emit_at(20, EdgeKind::Rising, 0);
/// gpio.emit_at(20, EdgeKind::Falling, 1000);
/// ```
#[derive(Clone)]
pub struct MockGpio {
    state: Arc<Mutex<MockState>>,
    clock: Arc<ManualClock>,
    pulses: Arc<watch::Sender<u64>>,
}

impl Default for MockGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGpio {
    /// Backend with all lines free and its own [`ManualClock`].
    pub fn new() -> Self {
        let (pulses, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            clock: Arc::new(ManualClock::new()),
            pulses: Arc::new(pulses),
        }
    }

    /// Clock used for timestamps; hand this to the engine.
    pub fn clock(&self) -> Arc<ManualClock> {
        Arc::clone(&self.clock)
    }

    /// Make every acquisition of `line` fail.
    pub fn fail_line(&self, line: u32) {
        self.state.lock().failing.insert(line);
    }

    /// Whether `line` is currently claimed.
    pub fn is_acquired(&self, line: u32) -> bool {
        self.state
            .lock()
            .lines
            .get(&line)
            .is_some_and(|state| state.acquired)
    }

    /// Current output level of `line`.
    pub fn level(&self, line: u32) -> bool {
        self.state
            .lock()
            .lines
            .get(&line)
            .is_some_and(|state| state.high)
    }

    /// Everything that happened so far.
    pub fn events(&self) -> Vec<LineEvent> {
        self.state.lock().events.clone()
    }

    /// Completed trigger pulses (high followed by low).
    pub fn pulse_count(&self) -> u64 {
        *self.pulses.borrow()
    }

    /// Wait until at least `count` trigger pulses have completed.
    pub async fn wait_for_pulses(&self, count: u64) {
        let mut rx = self.pulses.subscribe();
        // the sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|pulses| *pulses >= count).await;
    }

    /// Drive an echo line and run its edge callback.
    ///
    /// Returns false when the line is not claimed (nothing is notified).
    pub fn emit(&self, line: u32, kind: EdgeKind) -> bool {
        let callback = {
            let mut state = self.state.lock();
            let Some(line_state) = state.lines.get_mut(&line).filter(|s| s.acquired) else {
                return false;
            };
            line_state.high = kind == EdgeKind::Rising;
            line_state.callback.clone()
        };
        if let Some(callback) = callback {
            callback(kind);
        }
        true
    }

    /// Set the clock to `at_us`, then [`MockGpio::emit`].
    pub fn emit_at(&self, line: u32, kind: EdgeKind, at_us: u64) -> bool {
        self.clock.set_us(at_us);
        self.emit(line, kind)
    }
}

impl GpioBackend for MockGpio {
    fn acquire_trigger(&self, line: u32) -> Result<Box<dyn TriggerLine>> {
        let mut state = self.state.lock();
        let line_state = state.claim(line)?;
        line_state.high = false;
        Ok(Box::new(MockTriggerLine {
            line,
            state: Arc::clone(&self.state),
            pulses: Arc::clone(&self.pulses),
        }))
    }

    fn acquire_echo(&self, line: u32, on_edge: EdgeCallback) -> Result<Box<dyn EchoLine>> {
        let mut state = self.state.lock();
        let line_state = state.claim(line)?;
        line_state.callback = Some(on_edge);
        Ok(Box::new(MockEchoLine {
            line,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockTriggerLine {
    line: u32,
    state: Arc<Mutex<MockState>>,
    pulses: Arc<watch::Sender<u64>>,
}

impl TriggerLine for MockTriggerLine {
    fn line(&self) -> u32 {
        self.line
    }

    fn set_level(&mut self, high: bool) {
        let falling = {
            let mut state = self.state.lock();
            state.events.push(LineEvent::Level(self.line, high));
            match state.lines.get_mut(&self.line) {
                Some(line_state) => {
                    let falling = line_state.high && !high;
                    line_state.high = high;
                    falling
                }
                None => false,
            }
        };
        if falling {
            self.pulses.send_modify(|pulses| *pulses += 1);
        }
    }

    fn release(self: Box<Self>) {
        self.state.lock().release(self.line);
    }
}

struct MockEchoLine {
    line: u32,
    state: Arc<Mutex<MockState>>,
}

impl EchoLine for MockEchoLine {
    fn line(&self) -> u32 {
        self.line
    }

    fn is_high(&self) -> bool {
        self.state
            .lock()
            .lines
            .get(&self.line)
            .is_some_and(|state| state.high)
    }

    fn release(self: Box<Self>) {
        self.state.lock().release(self.line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn failing_line_cannot_be_claimed() {
        let gpio = MockGpio::new();
        gpio.fail_line(21);
        let callback: EdgeCallback = Arc::new(|_| {});
        assert!(gpio.acquire_echo(21, callback).is_err());
        assert!(!gpio.is_acquired(21));
    }

    #[test]
    fn double_claim_is_rejected() {
        let gpio = MockGpio::new();
        let _trigger = gpio.acquire_trigger(16).unwrap();
        assert!(gpio.acquire_trigger(16).is_err());
    }

    #[test]
    fn emit_runs_callback_until_release() {
        let gpio = MockGpio::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let callback: EdgeCallback = {
            let seen = Arc::clone(&seen);
            Arc::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
        };
        let echo = gpio.acquire_echo(20, callback).unwrap();
        assert!(gpio.emit(20, EdgeKind::Rising));
        assert!(echo.is_high());
        echo.release();
        assert!(!gpio.emit(20, EdgeKind::Falling));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pulse_counted_on_falling_trigger() {
        let gpio = MockGpio::new();
        let mut trigger = gpio.acquire_trigger(16).unwrap();
        trigger.set_level(true);
        assert_eq!(gpio.pulse_count(), 0);
        trigger.set_level(false);
        assert_eq!(gpio.pulse_count(), 1);
        trigger.set_level(false);
        assert_eq!(gpio.pulse_count(), 1);
        trigger.release();
        assert_eq!(
            gpio.events(),
            vec![
                LineEvent::Acquired(16),
                LineEvent::Level(16, true),
                LineEvent::Level(16, false),
                LineEvent::Level(16, false),
                LineEvent::Released(16),
            ]
        );
    }

    #[test]
    fn manual_clock_moves_on_request() {
        let clock = ManualClock::new();
        clock.set_us(10);
        clock.advance_us(5);
        assert_eq!(clock.now_us(), 15);
    }
}
