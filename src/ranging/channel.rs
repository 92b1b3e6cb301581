//! Per-channel timing state machine.
//!
//! ```text
//! Idle --Rising--> EchoActive --Falling--> Completed
//!                       \------expiry----> TimedOut
//! (any) --trigger reset--> Idle
//! ```
//!
//! Phase, timestamps and the cycle bookkeeping live under one `parking_lot::Mutex`
//! per channel, so the edge context, the timeout supervisor and the scheduler never
//! see a torn combination of phase and timestamp. Every critical section is a handful
//! of field writes; nothing inside blocks or allocates.
//!
//! A channel accepts edges only while its cycle is *open*: from the trigger reset until
//! the guard of that trigger expires or is cancelled. Edges outside an open cycle are
//! noise.

use parking_lot::Mutex;
use serde::Serialize;

use super::distance::{self, Distance};
use super::edge::{ChannelId, EdgeEvent, EdgeKind};

/// Phase of a channel within a measurement cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    /// Waiting for the echo line to go high.
    Idle,
    /// Echo pulse in progress; start timestamp recorded.
    EchoActive,
    /// Echo ended; distance computed.
    Completed,
    /// Guard expired while the echo was still high.
    TimedOut,
}

impl Phase {
    /// Terminal phases close the measurement for the cycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::TimedOut)
    }
}

/// Result of feeding an edge into a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOutcome {
    /// Rising edge accepted, echo started.
    Started,
    /// Falling edge accepted, measurement finished with this distance.
    Completed(Distance),
    /// Edge does not fit the phase or arrived outside an open cycle.
    Spurious,
}

/// Result of the guard expiring for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryOutcome {
    /// Echo was still high: forced to `TimedOut`.
    TimedOut,
    /// No echo ever started in this cycle.
    NoEcho,
    /// The channel had already reached a terminal phase.
    Settled,
    /// The expiry belongs to an older cycle.
    Stale,
}

/// Copy of a channel's state for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelSnapshot {
    /// Channel identity.
    pub id: ChannelId,
    /// Echo GPIO line.
    pub echo_line: u32,
    /// Current phase.
    pub phase: Phase,
    /// Cycle the state belongs to.
    pub cycle: u64,
    /// Whether edges are currently accepted.
    pub open: bool,
    /// Echo start, if seen in this cycle.
    pub start_us: Option<u64>,
    /// Echo end, if seen in this cycle.
    pub end_us: Option<u64>,
    /// Last computed distance.
    pub distance: Distance,
    /// Set once a terminal phase is reached.
    pub completed: bool,
}

#[derive(Debug)]
struct Timing {
    phase: Phase,
    cycle: u64,
    open: bool,
    start_us: Option<u64>,
    end_us: Option<u64>,
    distance: Distance,
    completed: bool,
}

/// One echo channel and its timing state.
#[derive(Debug)]
pub struct Channel {
    id: ChannelId,
    echo_line: u32,
    timing: Mutex<Timing>,
}

impl Channel {
    /// New idle channel with no open cycle.
    pub fn new(id: ChannelId, echo_line: u32) -> Self {
        Self {
            id,
            echo_line,
            timing: Mutex::new(Timing {
                phase: Phase::Idle,
                cycle: 0,
                open: false,
                start_us: None,
                end_us: None,
                distance: Distance::INVALID,
                completed: false,
            }),
        }
    }

    /// Channel identity.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Echo GPIO line.
    pub fn echo_line(&self) -> u32 {
        self.echo_line
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.timing.lock().phase
    }

    /// An echo of the open cycle is still in flight.
    pub fn is_busy(&self) -> bool {
        let timing = self.timing.lock();
        timing.open && timing.phase == Phase::EchoActive
    }

    /// True when the channel has nothing left to do in `cycle`.
    pub fn is_settled(&self, cycle: u64) -> bool {
        let timing = self.timing.lock();
        timing.cycle != cycle || timing.phase.is_terminal()
    }

    /// Start a new cycle: back to `Idle`, timestamps and completion flag cleared.
    pub fn reset(&self, cycle: u64) {
        let mut timing = self.timing.lock();
        timing.phase = Phase::Idle;
        timing.cycle = cycle;
        timing.open = true;
        timing.start_us = None;
        timing.end_us = None;
        timing.completed = false;
    }

    /// Feed an edge. Only the matching transition mutates state.
    pub fn apply_edge(&self, event: &EdgeEvent) -> EdgeOutcome {
        let mut timing = self.timing.lock();
        if !timing.open {
            return EdgeOutcome::Spurious;
        }
        match (event.kind, timing.phase) {
            (EdgeKind::Rising, Phase::Idle) => {
                timing.phase = Phase::EchoActive;
                timing.start_us = Some(event.timestamp_us);
                EdgeOutcome::Started
            }
            (EdgeKind::Falling, Phase::EchoActive) => {
                let distance = match timing.start_us {
                    Some(start) => distance::compute(start, event.timestamp_us),
                    None => Distance::INVALID,
                };
                timing.phase = Phase::Completed;
                timing.end_us = Some(event.timestamp_us);
                timing.distance = distance;
                timing.completed = true;
                EdgeOutcome::Completed(distance)
            }
            _ => EdgeOutcome::Spurious,
        }
    }

    /// Guard of `cycle` expired: force the pending echo to `TimedOut` and close the cycle.
    pub fn expire(&self, cycle: u64) -> ExpiryOutcome {
        let mut timing = self.timing.lock();
        if timing.cycle != cycle || !timing.open {
            return ExpiryOutcome::Stale;
        }
        timing.open = false;
        match timing.phase {
            Phase::EchoActive => {
                timing.phase = Phase::TimedOut;
                timing.distance = Distance::INVALID;
                timing.completed = true;
                ExpiryOutcome::TimedOut
            }
            Phase::Idle => ExpiryOutcome::NoEcho,
            Phase::Completed | Phase::TimedOut => ExpiryOutcome::Settled,
        }
    }

    /// Stop accepting edges for `cycle` without producing a result.
    pub fn close(&self, cycle: u64) {
        let mut timing = self.timing.lock();
        if timing.cycle == cycle {
            timing.open = false;
        }
    }

    /// Consistent copy of the current state.
    pub fn snapshot(&self) -> ChannelSnapshot {
        let timing = self.timing.lock();
        ChannelSnapshot {
            id: self.id,
            echo_line: self.echo_line,
            phase: timing.phase,
            cycle: timing.cycle,
            open: timing.open,
            start_us: timing.start_us,
            end_us: timing.end_us,
            distance: timing.distance,
            completed: timing.completed,
        }
    }
}
