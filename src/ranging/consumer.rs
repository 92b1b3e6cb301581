//! Consumer task: drains the measurement store and forwards readings.
//!
//! The task sleeps on the store's notification with an upper bound of the configured
//! poll interval, so a stop request is always seen within that bound even if no
//! edges arrive. Everything expensive (logging, readout updates, sinks) happens here
//! rather than in the edge context.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use super::distance::Distance;
use super::edge::ChannelId;
use super::engine::EngineShared;

/// A drained measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reading {
    /// Channel it came from.
    pub channel: ChannelId,
    /// Distance or the sentinel.
    pub distance: Distance,
}

/// Latest drained distance per channel, as shown by the readout surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Readout {
    /// `None` until the channel produced its first reading.
    pub channels: [Option<Distance>; 2],
    /// Total readings drained so far.
    pub readings: u64,
}

impl Readout {
    /// Latest value for `channel`.
    pub fn get(&self, channel: ChannelId) -> Option<Distance> {
        self.channels[channel.index()]
    }

    /// Whether anything has been drained yet.
    pub fn is_empty(&self) -> bool {
        self.readings == 0
    }
}

/// Destination for drained readings besides the readout.
pub trait MeasurementSink: Send + Sync {
    /// Handle one reading. Called from the consumer task only.
    fn forward(&self, reading: &Reading);
}

/// Default sink: one log line per reading.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MeasurementSink for TracingSink {
    fn forward(&self, reading: &Reading) {
        match reading.distance.millimetres() {
            Some(mm) => info!(
                channel = %reading.channel,
                distance = reading.distance.raw(),
                mm = format_args!("{:.1}", mm),
                "Distance measured"
            ),
            None => debug!(channel = %reading.channel, "No valid echo in this cycle"),
        }
    }
}

pub(crate) struct ConsumerTask {
    shared: Arc<EngineShared>,
    sink: Arc<dyn MeasurementSink>,
    readout_tx: Arc<watch::Sender<Readout>>,
    period_rx: watch::Receiver<u32>,
    stop_rx: watch::Receiver<bool>,
    poll: Duration,
}

impl ConsumerTask {
    pub(crate) fn new(
        shared: Arc<EngineShared>,
        sink: Arc<dyn MeasurementSink>,
        readout_tx: Arc<watch::Sender<Readout>>,
        period_rx: watch::Receiver<u32>,
        stop_rx: watch::Receiver<bool>,
        poll: Duration,
    ) -> Self {
        Self {
            shared,
            sink,
            readout_tx,
            period_rx,
            stop_rx,
            poll,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!(poll_ms = self.poll.as_millis() as u64, "Consumer task started");
        loop {
            if *self.stop_rx.borrow() {
                break;
            }
            self.drain_all();

            tokio::select! {
                changed = self.stop_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = self.shared.store.notified() => {}
                changed = self.period_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let period = *self.period_rx.borrow_and_update();
                    info!(period_secs = period, "Sampling period updated");
                }
                _ = tokio::time::sleep(self.poll) => {}
            }
        }
        debug!("Consumer task stopped");
    }

    fn drain_all(&self) {
        for channel in ChannelId::ALL {
            if let Some(distance) = self.shared.store.drain(channel) {
                let reading = Reading { channel, distance };
                self.readout_tx.send_modify(|readout| {
                    readout.channels[channel.index()] = Some(distance);
                    readout.readings += 1;
                });
                self.sink.forward(&reading);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn empty_readout_has_no_channels() {
        let readout = Readout::default();
        assert!(readout.is_empty());
        assert_eq!(readout.get(ChannelId::First), None);
    }

    #[test]
    #[traced_test]
    fn tracing_sink_logs_each_reading() {
        TracingSink.forward(&Reading {
            channel: ChannelId::First,
            distance: Distance::from_raw(1_750_000),
        });
        assert!(logs_contain("Distance measured"));
        assert!(logs_contain("mm=175.0"));

        TracingSink.forward(&Reading {
            channel: ChannelId::Second,
            distance: Distance::INVALID,
        });
        assert!(logs_contain("No valid echo in this cycle"));
    }
}
