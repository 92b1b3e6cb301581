//! Edge events delivered by the echo lines.
//!
//! The hardware layer only reports *that* a line changed level. Turning that into a
//! timestamped [`EdgeEvent`] happens here, inside the notification context, so the
//! timestamp is taken as close to the transition as the host allows.

use serde::{Deserialize, Serialize};

use crate::hardware::Clock;

/// Identity of one of the two echo channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChannelId {
    /// Channel 0.
    First,
    /// Channel 1.
    Second,
}

impl ChannelId {
    /// Both channels in index order.
    pub const ALL: [ChannelId; 2] = [ChannelId::First, ChannelId::Second];

    /// Array index of this channel.
    pub fn index(self) -> usize {
        match self {
            ChannelId::First => 0,
            ChannelId::Second => 1,
        }
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Direction of a level transition on an echo line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Low to high: the echo pulse started.
    Rising,
    /// High to low: the echo pulse ended.
    Falling,
}

impl EdgeKind {
    /// Classify an edge from the level read right after the notification.
    pub fn from_level(high: bool) -> Self {
        if high {
            EdgeKind::Rising
        } else {
            EdgeKind::Falling
        }
    }
}

/// A timestamped transition on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    /// Channel whose echo line changed.
    pub channel: ChannelId,
    /// Transition direction.
    pub kind: EdgeKind,
    /// Monotonic time of the transition in microseconds.
    pub timestamp_us: u64,
}

impl EdgeEvent {
    /// Stamp a transition with the current time of `clock`.
    pub fn capture(channel: ChannelId, kind: EdgeKind, clock: &dyn Clock) -> Self {
        Self {
            channel,
            kind,
            timestamp_us: clock.now_us(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::ManualClock;

    #[test]
    fn channel_indices_match_order() {
        for (position, channel) in ChannelId::ALL.iter().enumerate() {
            assert_eq!(channel.index(), position);
        }
        assert_eq!(ChannelId::Second.to_string(), "1");
    }

    #[test]
    fn capture_uses_clock_time() {
        let clock = ManualClock::new();
        clock.set_us(1234);
        let event = EdgeEvent::capture(ChannelId::Second, EdgeKind::Rising, &clock);
        assert_eq!(event.timestamp_us, 1234);
        assert_eq!(event.channel, ChannelId::Second);
    }

    #[test]
    fn level_classifies_edge() {
        assert_eq!(EdgeKind::from_level(true), EdgeKind::Rising);
        assert_eq!(EdgeKind::from_level(false), EdgeKind::Falling);
    }
}
