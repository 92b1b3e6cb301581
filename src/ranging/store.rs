//! Latest-value store shared between the producers and the consumer task.
//!
//! One slot per channel, each behind its own `parking_lot::Mutex`, so publishing to
//! one channel never touches the other. A publish overwrites whatever is there:
//! there is no queue, and a value replaced before it was drained is lost.
//!
//! Publishers also poke a [`Notify`] so the consumer can sleep until something
//! arrives instead of spinning. `Notify::notify_one` never blocks and is safe to
//! call from the edge context.

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::distance::Distance;
use super::edge::ChannelId;

#[derive(Debug, Clone, Copy)]
struct Slot {
    value: Distance,
    fresh: bool,
}

/// Per-channel latest distance plus a fresh flag.
#[derive(Debug)]
pub struct MeasurementStore {
    slots: [Mutex<Slot>; 2],
    notify: Notify,
}

impl Default for MeasurementStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementStore {
    /// Empty store; nothing is fresh.
    pub fn new() -> Self {
        let empty = || {
            Mutex::new(Slot {
                value: Distance::INVALID,
                fresh: false,
            })
        };
        Self {
            slots: [empty(), empty()],
            notify: Notify::new(),
        }
    }

    /// Overwrite the value for `channel` and mark it fresh.
    pub fn publish(&self, channel: ChannelId, distance: Distance) {
        {
            let mut slot = self.slots[channel.index()].lock();
            slot.value = distance;
            slot.fresh = true;
        }
        self.notify.notify_one();
    }

    /// Take the value if it has not been observed yet.
    pub fn drain(&self, channel: ChannelId) -> Option<Distance> {
        let mut slot = self.slots[channel.index()].lock();
        if slot.fresh {
            slot.fresh = false;
            Some(slot.value)
        } else {
            None
        }
    }

    /// Drop an undrained value without reporting it.
    ///
    /// Returns true if something fresh was thrown away.
    pub fn discard(&self, channel: ChannelId) -> bool {
        let mut slot = self.slots[channel.index()].lock();
        std::mem::replace(&mut slot.fresh, false)
    }

    /// Whether `channel` holds a value the consumer has not seen.
    pub fn is_fresh(&self, channel: ChannelId) -> bool {
        self.slots[channel.index()].lock().fresh
    }

    /// Wait until a publish happens (or a permit from an earlier one is pending).
    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    /// Wake the consumer without publishing, e.g. on shutdown.
    pub fn wake(&self) {
        self.notify.notify_one();
    }
}
