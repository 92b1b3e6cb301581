//! Measurement pipeline
//!
//! Leaf to root:
//!
//! - **`edge`**: channel identities and timestamped edge events.
//! - **`channel`**: per-channel `Idle → EchoActive → {Completed, TimedOut}` state machine.
//! - **`distance`**: pure pulse-width to distance conversion and the invalid sentinel.
//! - **`timeout`**: single-shot guard armed after each trigger pulse.
//! - **`scheduler`**: periodic task that owns and pulses the trigger line.
//! - **`store`**: latest distance per channel with a fresh flag.
//! - **`consumer`**: task that drains the store and forwards readings.
//! - **`engine`**: owns all of the above and implements start/stop.

pub mod channel;
pub mod consumer;
pub mod distance;
pub mod edge;
pub mod engine;
pub mod scheduler;
pub mod store;
pub mod timeout;

pub use channel::{ChannelSnapshot, Phase};
pub use consumer::{MeasurementSink, Reading, Readout, TracingSink};
pub use distance::{Distance, SPEED_OF_SOUND_HALF};
pub use edge::{ChannelId, EdgeEvent, EdgeKind};
pub use engine::{RangingEngine, StatsSnapshot};
