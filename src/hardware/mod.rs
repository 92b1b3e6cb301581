//! Hardware Boundary
//!
//! This module defines the small set of traits the ranging engine needs from the
//! host: one shared trigger output, two edge-notifying echo inputs, and a monotonic
//! clock. Backends implement these traits; the engine never touches GPIO directly.
//!
//! - `GpioBackend` hands out lines and is the only place a line can be acquired.
//! - `TriggerLine` is written by the trigger scheduler only.
//! - `EchoLine` is read once at startup for diagnostics; transitions arrive through
//!   the `EdgeCallback` registered at acquisition time.
//! - `Clock` stamps edges in microseconds.
//!
//! # Design Philosophy
//!
//! Unlike instrument capabilities these traits are synchronous: edge callbacks run
//! in a notification context that must not wait, and trigger writes happen inside a
//! microsecond-scale pulse. Errors use `anyhow::Result`; the engine attaches the
//! line number and role when it turns them into `SonarError::ResourceUnavailable`.
//!
//! # Available Backends
//!
//! - `mock::MockGpio` - deterministic edge injection for tests
//! - `simulated::SimulatedSensors` - echoes produced from configured target distances

pub mod clock;
pub mod mock;
pub mod simulated;

use std::sync::Arc;

use anyhow::Result;

use crate::ranging::EdgeKind;

pub use clock::MonotonicClock;

/// Called on every echo line transition.
///
/// Runs in the notification context: implementations must return quickly and never
/// block or panic.
pub type EdgeCallback = Arc<dyn Fn(EdgeKind) + Send + Sync>;

/// Monotonic time source with microsecond resolution.
pub trait Clock: Send + Sync {
    /// Microseconds since an arbitrary fixed origin. Never decreases.
    fn now_us(&self) -> u64;
}

/// The shared output that fires both sensors.
pub trait TriggerLine: Send {
    /// GPIO number.
    fn line(&self) -> u32;

    /// Drive the line high or low.
    fn set_level(&mut self, high: bool);

    /// Give the line back to the backend. No writes are possible afterwards.
    fn release(self: Box<Self>);
}

/// One echo input.
pub trait EchoLine: Send {
    /// GPIO number.
    fn line(&self) -> u32;

    /// Current level.
    fn is_high(&self) -> bool;

    /// Stop edge notifications and give the line back.
    fn release(self: Box<Self>);
}

/// Source of GPIO lines.
pub trait GpioBackend: Send + Sync {
    /// Claim `line` as an output, initially low.
    fn acquire_trigger(&self, line: u32) -> Result<Box<dyn TriggerLine>>;

    /// Claim `line` as an input notifying both edges through `on_edge`.
    fn acquire_echo(&self, line: u32, on_edge: EdgeCallback) -> Result<Box<dyn EchoLine>>;
}
