//! Periodic trigger task.
//!
//! The scheduler is the only owner of the trigger line. It sleeps for the configured
//! period, resets both channels, pulses the line and arms the timeout guard. A period
//! change restarts the wait from the moment of the change; a period of `0` parks the
//! task and cancels whatever guard is pending.
//!
//! When the task ends it hands the trigger line back so the engine can drive it low
//! and release it after the remaining shutdown steps.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::engine::EngineShared;
use crate::hardware::clock::spin_for_us;
use crate::hardware::TriggerLine;

/// Fires the shared trigger line at the configured rate.
pub struct TriggerScheduler {
    shared: Arc<EngineShared>,
    trigger: Box<dyn TriggerLine>,
    period_rx: watch::Receiver<u32>,
    stop_rx: watch::Receiver<bool>,
    pulse_us: u64,
}

impl TriggerScheduler {
    pub(crate) fn new(
        shared: Arc<EngineShared>,
        trigger: Box<dyn TriggerLine>,
        period_rx: watch::Receiver<u32>,
        stop_rx: watch::Receiver<bool>,
        pulse_us: u64,
    ) -> Self {
        Self {
            shared,
            trigger,
            period_rx,
            stop_rx,
            pulse_us,
        }
    }

    /// Run until stopped, then return the trigger line.
    pub async fn run(mut self) -> Box<dyn TriggerLine> {
        info!(line = self.trigger.line(), "Trigger scheduler started");
        loop {
            if *self.stop_rx.borrow() {
                break;
            }
            let period = *self.period_rx.borrow_and_update();

            if period == 0 {
                self.shared.cancel_cycle();
                tokio::select! {
                    changed = self.period_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = self.stop_rx.changed() => break,
                }
                continue;
            }

            let wait = tokio::time::sleep(Duration::from_secs(u64::from(period)));
            tokio::select! {
                _ = wait => self.fire(),
                changed = self.period_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let period = *self.period_rx.borrow();
                    debug!(period, "Sampling period changed, rescheduling from now");
                }
                _ = self.stop_rx.changed() => break,
            }
        }
        info!("Trigger scheduler stopped");
        self.trigger
    }

    fn fire(&mut self) {
        let shared = &self.shared;
        if shared.cycle_pending() {
            shared.stats.record_skip();
            warn!("Previous measurement cycle still pending, skipping trigger");
            return;
        }

        let cycle = shared.begin_cycle();

        self.trigger.set_level(true);
        spin_for_us(self.pulse_us);
        self.trigger.set_level(false);
        shared.stats.record_pulse();

        shared.arm_guard(cycle);
        debug!(cycle, "Trigger pulse issued");
    }
}
