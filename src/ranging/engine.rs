//! The ranging engine: owns all per-channel state and the background tasks.
//!
//! `RangingEngine` replaces module-wide globals with one owned instance. Each
//! execution context gets an `Arc<EngineShared>`:
//!
//! - the edge callbacks registered with the echo lines (notification context),
//! - the [`TriggerScheduler`] task, which also owns the trigger line,
//! - the timeout guard task spawned by the [`TimeoutSupervisor`],
//! - the consumer task.
//!
//! # Lifecycle
//!
//! `start()` claims the trigger line and both echo lines, releasing everything
//! already claimed if any acquisition fails. `stop()` halts the scheduler, cancels
//! the pending guard, stops the consumer and only then drives the trigger low and
//! releases all lines.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut engine = RangingEngine::new(&SonarConfig::default())?;
//! let gpio = MockGpio::new();
//! engine.start(Arc::new(gpio.clone()), gpio.clock())?;
//! engine.set_period(1)?;
//! let mut readings = engine.subscribe();
//! readings.changed().await?;
//! engine.stop().await?;
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::channel::{Channel, ChannelSnapshot, EdgeOutcome, ExpiryOutcome, Phase};
use super::consumer::{ConsumerTask, MeasurementSink, Readout, TracingSink};
use super::distance::Distance;
use super::edge::{ChannelId, EdgeEvent, EdgeKind};
use super::scheduler::TriggerScheduler;
use super::store::MeasurementStore;
use super::timeout::TimeoutSupervisor;
use crate::config::{PinConfig, SonarConfig, TimingConfig, MAX_PERIOD_SECS};
use crate::error::{LineRole, SonarError, SonarResult};
use crate::hardware::{Clock, EchoLine, EdgeCallback, GpioBackend, TriggerLine};

// =============================================================================
// Statistics
// =============================================================================

/// Event counters, updated lock-free from every context.
#[derive(Debug, Default)]
pub(crate) struct EngineStats {
    pulses: AtomicU64,
    skipped: AtomicU64,
    completed: AtomicU64,
    timeouts: AtomicU64,
    no_echo: AtomicU64,
    spurious: AtomicU64,
    discarded: AtomicU64,
}

impl EngineStats {
    pub(crate) fn record_pulse(&self) {
        self.pulses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pulses: self.pulses.load(Ordering::Relaxed),
            skipped_triggers: self.skipped.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            no_echo: self.no_echo.load(Ordering::Relaxed),
            spurious_edges: self.spurious.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Trigger pulses issued.
    pub pulses: u64,
    /// Triggers skipped because the previous cycle was still pending.
    pub skipped_triggers: u64,
    /// Echoes that ended with a falling edge.
    pub completed: u64,
    /// Echoes forced to `TimedOut`.
    pub timeouts: u64,
    /// Cycles in which a channel never saw its echo start.
    pub no_echo: u64,
    /// Edges ignored as noise.
    pub spurious_edges: u64,
    /// Readings dropped by a trigger reset before the consumer drained them.
    pub discarded: u64,
}

// =============================================================================
// Shared state
// =============================================================================

/// State reachable from every execution context.
pub(crate) struct EngineShared {
    channels: [Channel; 2],
    pub(crate) store: MeasurementStore,
    supervisor: Arc<TimeoutSupervisor>,
    clock: Arc<dyn Clock>,
    cycle: AtomicU64,
    accepting: AtomicBool,
    pub(crate) stats: Arc<EngineStats>,
}

impl EngineShared {
    fn new(
        pins: &PinConfig,
        timing: &TimingConfig,
        clock: Arc<dyn Clock>,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            channels: [
                Channel::new(ChannelId::First, pins.echo[0]),
                Channel::new(ChannelId::Second, pins.echo[1]),
            ],
            store: MeasurementStore::new(),
            supervisor: Arc::new(TimeoutSupervisor::new(timing.echo_timeout())),
            clock,
            cycle: AtomicU64::new(0),
            accepting: AtomicBool::new(false),
            stats,
        }
    }

    fn channel(&self, id: ChannelId) -> &Channel {
        &self.channels[id.index()]
    }

    /// Edge notification entry point. Never blocks, never panics.
    fn on_edge(&self, channel: ChannelId, kind: EdgeKind) {
        if !self.accepting.load(Ordering::Acquire) {
            return;
        }
        let event = EdgeEvent::capture(channel, kind, self.clock.as_ref());
        match self.channel(channel).apply_edge(&event) {
            EdgeOutcome::Started => {}
            EdgeOutcome::Completed(distance) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                self.store.publish(channel, distance);
                let cycle = self.cycle.load(Ordering::Acquire);
                if self.channels.iter().all(|c| c.is_settled(cycle)) {
                    self.supervisor.disarm(cycle);
                }
            }
            EdgeOutcome::Spurious => {
                self.stats.spurious.fetch_add(1, Ordering::Relaxed);
                let reason = SonarError::SpuriousEdge { channel, edge: kind };
                trace!(error = %reason, "Edge ignored");
            }
        }
    }

    /// True while the previous trigger's guard is armed or an echo is in flight.
    pub(crate) fn cycle_pending(&self) -> bool {
        self.supervisor.is_armed() || self.channels.iter().any(Channel::is_busy)
    }

    /// Reset both channels for a new cycle and drop undrained readings.
    pub(crate) fn begin_cycle(&self) -> u64 {
        let cycle = self.cycle.fetch_add(1, Ordering::AcqRel) + 1;
        for channel in &self.channels {
            channel.reset(cycle);
            if self.store.discard(channel.id()) {
                self.stats.discarded.fetch_add(1, Ordering::Relaxed);
                debug!(channel = %channel.id(), cycle, "Undrained reading discarded by new trigger");
            }
        }
        cycle
    }

    pub(crate) fn arm_guard(self: &Arc<Self>, cycle: u64) {
        let shared = Arc::clone(self);
        self.supervisor
            .arm(cycle, move |cycle| shared.expire_cycle(cycle));
    }

    fn expire_cycle(&self, cycle: u64) {
        for channel in &self.channels {
            let id = channel.id();
            match channel.expire(cycle) {
                ExpiryOutcome::TimedOut => {
                    self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                    self.store.publish(id, Distance::INVALID);
                    let reason = SonarError::MeasurementTimeout { channel: id };
                    debug!(error = %reason, cycle, "Echo forced to timed out");
                }
                ExpiryOutcome::NoEcho => {
                    self.stats.no_echo.fetch_add(1, Ordering::Relaxed);
                    self.store.publish(id, Distance::INVALID);
                    debug!(channel = %id, cycle, "No echo started before the deadline");
                }
                ExpiryOutcome::Settled | ExpiryOutcome::Stale => {}
            }
        }
    }

    /// Cancel the pending guard and stop accepting edges for its cycle.
    pub(crate) fn cancel_cycle(&self) {
        if let Some(cycle) = self.supervisor.cancel() {
            for channel in &self.channels {
                channel.close(cycle);
            }
            debug!(cycle, "Pending timeout guard cancelled");
        }
    }
}

fn edge_callback(shared: &Arc<EngineShared>, channel: ChannelId) -> EdgeCallback {
    let shared = Arc::clone(shared);
    Arc::new(move |kind| shared.on_edge(channel, kind))
}

// =============================================================================
// RangingEngine
// =============================================================================

struct Running {
    shared: Arc<EngineShared>,
    echoes: Vec<Box<dyn EchoLine>>,
    scheduler: JoinHandle<Box<dyn TriggerLine>>,
    consumer: JoinHandle<()>,
    scheduler_stop: watch::Sender<bool>,
    consumer_stop: watch::Sender<bool>,
}

/// Dual-channel ranging engine.
pub struct RangingEngine {
    pins: PinConfig,
    timing: TimingConfig,
    period_tx: Arc<watch::Sender<u32>>,
    readout_tx: Arc<watch::Sender<Readout>>,
    sink: Arc<dyn MeasurementSink>,
    stats: Arc<EngineStats>,
    running: Option<Running>,
}

impl RangingEngine {
    /// Build a stopped engine from validated configuration.
    pub fn new(config: &SonarConfig) -> SonarResult<Self> {
        config.validate()?;
        let (period_tx, _) = watch::channel(config.timing.sample_period_secs);
        let (readout_tx, _) = watch::channel(Readout::default());
        Ok(Self {
            pins: config.pins.clone(),
            timing: config.timing.clone(),
            period_tx: Arc::new(period_tx),
            readout_tx: Arc::new(readout_tx),
            sink: Arc::new(TracingSink),
            stats: Arc::new(EngineStats::default()),
            running: None,
        })
    }

    /// Replace the default logging sink.
    pub fn with_sink(mut self, sink: Arc<dyn MeasurementSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Claim the lines and spawn the scheduler and consumer tasks.
    ///
    /// Must be called from within a tokio runtime. On `ResourceUnavailable` every
    /// line claimed so far has been released again.
    pub fn start(&mut self, backend: Arc<dyn GpioBackend>, clock: Arc<dyn Clock>) -> SonarResult<()> {
        if self.running.is_some() {
            return Err(SonarError::AlreadyRunning);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SonarError::Runtime(e.to_string()))?;

        let shared = Arc::new(EngineShared::new(
            &self.pins,
            &self.timing,
            clock,
            Arc::clone(&self.stats),
        ));

        let mut trigger = backend
            .acquire_trigger(self.pins.trigger)
            .map_err(|source| SonarError::ResourceUnavailable {
                line: self.pins.trigger,
                role: LineRole::Trigger,
                source,
            })?;
        trigger.set_level(false);

        let mut echoes: Vec<Box<dyn EchoLine>> = Vec::with_capacity(2);
        for channel in ChannelId::ALL {
            let line = self.pins.echo[channel.index()];
            match backend.acquire_echo(line, edge_callback(&shared, channel)) {
                Ok(echo) => {
                    info!(channel = %channel, line, high = echo.is_high(), "Echo line acquired");
                    echoes.push(echo);
                }
                Err(source) => {
                    error!(channel = %channel, line, error = %source, "Unable to request echo GPIO");
                    for echo in echoes.into_iter().rev() {
                        echo.release();
                    }
                    trigger.release();
                    return Err(SonarError::ResourceUnavailable {
                        line,
                        role: LineRole::Echo(channel),
                        source,
                    });
                }
            }
        }

        shared.accepting.store(true, Ordering::Release);

        let (scheduler_stop, scheduler_stop_rx) = watch::channel(false);
        let (consumer_stop, consumer_stop_rx) = watch::channel(false);

        let scheduler = TriggerScheduler::new(
            Arc::clone(&shared),
            trigger,
            self.period_tx.subscribe(),
            scheduler_stop_rx,
            self.timing.trigger_pulse_us,
        );
        let consumer = ConsumerTask::new(
            Arc::clone(&shared),
            Arc::clone(&self.sink),
            Arc::clone(&self.readout_tx),
            self.period_tx.subscribe(),
            consumer_stop_rx,
            self.timing.consumer_poll(),
        );

        self.running = Some(Running {
            shared,
            echoes,
            scheduler: runtime.spawn(scheduler.run()),
            consumer: runtime.spawn(consumer.run()),
            scheduler_stop,
            consumer_stop,
        });

        info!(
            trigger = self.pins.trigger,
            period_secs = self.period(),
            echo_timeout_ms = self.timing.echo_timeout_ms,
            "Ranging engine started"
        );
        Ok(())
    }

    /// Shut down in order: scheduler, timeout guard, consumer, then the lines.
    ///
    /// Calling `stop` on a stopped engine is a no-op.
    pub async fn stop(&mut self) -> SonarResult<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        let mut errors = Vec::new();

        let _ = running.scheduler_stop.send(true);
        let trigger = match running.scheduler.await {
            Ok(trigger) => Some(trigger),
            Err(e) => {
                errors.push(SonarError::Runtime(format!("scheduler task failed: {}", e)));
                None
            }
        };

        running.shared.cancel_cycle();
        running.shared.accepting.store(false, Ordering::Release);

        let _ = running.consumer_stop.send(true);
        running.shared.store.wake();
        if let Err(e) = running.consumer.await {
            errors.push(SonarError::Runtime(format!("consumer task failed: {}", e)));
        }

        if let Some(mut trigger) = trigger {
            trigger.set_level(false);
            trigger.release();
        }
        for echo in running.echoes.into_iter().rev() {
            echo.release();
        }

        if errors.is_empty() {
            info!("Ranging engine stopped");
            Ok(())
        } else {
            warn!(count = errors.len(), "Ranging engine stopped with errors");
            Err(SonarError::ShutdownFailed(errors))
        }
    }

    /// Whether `start` succeeded and `stop` has not run yet.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Set the sampling period in seconds (`0` disables sampling).
    ///
    /// Out-of-range values are rejected and leave the current period in place.
    pub fn set_period(&self, period_secs: u32) -> SonarResult<()> {
        if period_secs > MAX_PERIOD_SECS {
            return Err(SonarError::InvalidConfig(format!(
                "sampling period {} out of range 0-{}",
                period_secs, MAX_PERIOD_SECS
            )));
        }
        self.period_tx.send_replace(period_secs);
        Ok(())
    }

    /// Current sampling period in seconds.
    pub fn period(&self) -> u32 {
        *self.period_tx.borrow()
    }

    /// Receiver that changes whenever the consumer drains a reading.
    pub fn subscribe(&self) -> watch::Receiver<Readout> {
        self.readout_tx.subscribe()
    }

    /// Latest drained readings.
    pub fn readout(&self) -> Readout {
        *self.readout_tx.borrow()
    }

    /// Phase of `channel`, `None` while stopped.
    pub fn channel_phase(&self, channel: ChannelId) -> Option<Phase> {
        self.channel_snapshot(channel).map(|snapshot| snapshot.phase)
    }

    /// Full timing state of `channel`, `None` while stopped.
    pub fn channel_snapshot(&self, channel: ChannelId) -> Option<ChannelSnapshot> {
        self.running
            .as_ref()
            .map(|running| running.shared.channel(channel).snapshot())
    }

    /// Whether an echo deadline is pending; `false` while stopped.
    pub fn guard_armed(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| running.shared.supervisor.is_armed())
    }

    /// Engine counters since construction.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Echo deadline armed after each pulse.
    pub fn echo_timeout(&self) -> Duration {
        self.timing.echo_timeout()
    }
}

impl Drop for RangingEngine {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            warn!("Ranging engine dropped while running; stopping tasks without releasing lines");
            let _ = running.scheduler_stop.send(true);
            running.shared.cancel_cycle();
            running.shared.accepting.store(false, Ordering::Release);
            let _ = running.consumer_stop.send(true);
            running.scheduler.abort();
            running.consumer.abort();
        }
    }
}
