//! Simulated HC-SR04 pair.
//!
//! Each completed trigger pulse starts a short-lived thread per echo line that raises
//! the line after the sensor's burst latency and lowers it again after the round-trip
//! time of the configured target. A target of `None` emulates an echo that never
//! comes back: the line stays high for [`STUCK_ECHO_US`], well past any sane engine
//! timeout, the way a real module does when nothing is in range.
//!
//! Edge callbacks run on those threads, which stand in for the interrupt context.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use rand::Rng;

use super::{EchoLine, EdgeCallback, GpioBackend, TriggerLine};
use crate::ranging::{Distance, EdgeKind};

/// Delay between the trigger falling and the echo rising (8-cycle burst at 40 kHz).
pub const BURST_LATENCY_US: u64 = 200;

/// How long a sensor holds its echo high when nothing reflects.
pub const STUCK_ECHO_US: u64 = 200_000;

struct SimEcho {
    target_mm: Option<f64>,
    acquired: bool,
    high: bool,
    callback: Option<EdgeCallback>,
}

struct SimState {
    echoes: HashMap<u32, SimEcho>,
    trigger: Option<u32>,
    jitter_us: u64,
}

/// GPIO backend that fakes two ultrasonic sensors.
#[derive(Clone)]
pub struct SimulatedSensors {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedSensors {
    /// Sensors on `echo_lines` looking at the given targets (millimetres).
    pub fn new(echo_lines: [u32; 2], targets_mm: [Option<f64>; 2], jitter_us: u64) -> Self {
        let echoes = echo_lines
            .into_iter()
            .zip(targets_mm)
            .map(|(line, target_mm)| {
                (
                    line,
                    SimEcho {
                        target_mm,
                        acquired: false,
                        high: false,
                        callback: None,
                    },
                )
            })
            .collect();
        Self {
            state: Arc::new(Mutex::new(SimState {
                echoes,
                trigger: None,
                jitter_us,
            })),
        }
    }

    fn fire(&self) {
        let state = self.state.lock();
        let mut rng = rand::thread_rng();
        for (&line, echo) in &state.echoes {
            if !echo.acquired || echo.high {
                continue;
            }
            let width_us = match echo.target_mm {
                Some(mm) => {
                    let jitter = if state.jitter_us > 0 {
                        rng.gen_range(0..=state.jitter_us)
                    } else {
                        0
                    };
                    Distance::round_trip_us_for_mm(mm) + jitter
                }
                None => STUCK_ECHO_US,
            };
            let shared = Arc::clone(&self.state);
            std::thread::spawn(move || run_echo(shared, line, width_us));
        }
    }
}

fn set_echo(state: &Mutex<SimState>, line: u32, high: bool) {
    let callback = {
        let mut state = state.lock();
        let Some(echo) = state.echoes.get_mut(&line).filter(|echo| echo.acquired) else {
            return;
        };
        echo.high = high;
        echo.callback.clone()
    };
    if let Some(callback) = callback {
        callback(EdgeKind::from_level(high));
    }
}

fn run_echo(state: Arc<Mutex<SimState>>, line: u32, width_us: u64) {
    std::thread::sleep(Duration::from_micros(BURST_LATENCY_US));
    set_echo(&state, line, true);
    std::thread::sleep(Duration::from_micros(width_us));
    set_echo(&state, line, false);
}

impl GpioBackend for SimulatedSensors {
    fn acquire_trigger(&self, line: u32) -> Result<Box<dyn TriggerLine>> {
        let mut state = self.state.lock();
        if state.echoes.contains_key(&line) {
            return Err(anyhow!("GPIO {} is wired as an echo input", line));
        }
        if state.trigger.is_some() {
            return Err(anyhow!("trigger GPIO already requested"));
        }
        state.trigger = Some(line);
        Ok(Box::new(SimTrigger {
            line,
            high: false,
            sensors: self.clone(),
        }))
    }

    fn acquire_echo(&self, line: u32, on_edge: EdgeCallback) -> Result<Box<dyn EchoLine>> {
        let mut state = self.state.lock();
        let echo = state
            .echoes
            .get_mut(&line)
            .ok_or_else(|| anyhow!("no simulated sensor on GPIO {}", line))?;
        if echo.acquired {
            return Err(anyhow!("GPIO {} already requested", line));
        }
        echo.acquired = true;
        echo.callback = Some(on_edge);
        Ok(Box::new(SimEchoLine {
            line,
            state: Arc::clone(&self.state),
        }))
    }
}

struct SimTrigger {
    line: u32,
    high: bool,
    sensors: SimulatedSensors,
}

impl TriggerLine for SimTrigger {
    fn line(&self) -> u32 {
        self.line
    }

    fn set_level(&mut self, high: bool) {
        let falling = self.high && !high;
        self.high = high;
        if falling {
            self.sensors.fire();
        }
    }

    fn release(self: Box<Self>) {
        self.sensors.state.lock().trigger = None;
    }
}

struct SimEchoLine {
    line: u32,
    state: Arc<Mutex<SimState>>,
}

impl EchoLine for SimEchoLine {
    fn line(&self) -> u32 {
        self.line
    }

    fn is_high(&self) -> bool {
        self.state
            .lock()
            .echoes
            .get(&self.line)
            .is_some_and(|echo| echo.high)
    }

    fn release(self: Box<Self>) {
        if let Some(echo) = self.state.lock().echoes.get_mut(&self.line) {
            echo.acquired = false;
            echo.callback = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn pulse_produces_rising_then_falling() {
        let sensors = SimulatedSensors::new([20, 21], [Some(100.0), Some(100.0)], 0);
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let callback: EdgeCallback = Arc::new(move |kind| {
            let _ = tx.lock().send(kind);
        });
        let echo = sensors.acquire_echo(20, callback).unwrap();
        let mut trigger = sensors.acquire_trigger(16).unwrap();

        trigger.set_level(true);
        trigger.set_level(false);

        let timeout = Duration::from_secs(1);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), EdgeKind::Rising);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), EdgeKind::Falling);
        assert!(!echo.is_high());
        echo.release();
        trigger.release();
    }

    #[test]
    fn echo_line_cannot_be_trigger() {
        let sensors = SimulatedSensors::new([20, 21], [None, None], 0);
        assert!(sensors.acquire_trigger(20).is_err());
        assert!(sensors.acquire_trigger(16).is_ok());
    }

    #[test]
    fn unknown_echo_line_fails() {
        let sensors = SimulatedSensors::new([20, 21], [None, None], 0);
        let callback: EdgeCallback = Arc::new(|_| {});
        assert!(sensors.acquire_echo(22, callback).is_err());
    }
}
