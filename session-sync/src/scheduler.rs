//! Backup cadence.
//!
//! ```text
//! Idle ──start──▶ AwaitingStabilization ──delay──▶ Running (first cycle)
//!                                                     │
//!                          ┌──────── tick ────────────┤
//!                          ▼                          ▼
//!                       Running ───── done ─────▶ Scheduled
//!
//! any state ──stop──▶ Stopped
//! ```
//!
//! A single background task owns the timer. Cycles run inline in that task,
//! so a slow cycle delays the next tick instead of overlapping it; missed
//! ticks are skipped. Stopping cancels the timer and waits for an in-flight
//! cycle to finish.

use crate::cycle::{CycleKind, CycleOutcome, SyncCycle};
use crate::utils::{Result, SyncError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    AwaitingStabilization,
    Scheduled,
    Running,
    Stopped,
}

/// Backup period, validated against a one minute floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSchedule {
    interval: Duration,
}

impl SyncSchedule {
    pub const MIN_INTERVAL_MS: u64 = 60_000;

    pub fn new(interval_ms: u64) -> Result<Self> {
        if interval_ms < Self::MIN_INTERVAL_MS {
            return Err(SyncError::Config(format!(
                "Invalid backup interval {}ms. Accepts values starting from {}ms (1 minute).",
                interval_ms,
                Self::MIN_INTERVAL_MS
            )));
        }
        Ok(Self {
            interval: Duration::from_millis(interval_ms),
        })
    }

    /// Bypass the floor so tests can tick quickly.
    #[cfg(test)]
    pub(crate) fn unchecked(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

pub struct SyncScheduler {
    schedule: SyncSchedule,
    stabilization_delay: Duration,
    cycle: Arc<SyncCycle>,
    state: Arc<watch::Sender<SchedulerState>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncScheduler {
    pub fn new(schedule: SyncSchedule, stabilization_delay: Duration, cycle: Arc<SyncCycle>) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            schedule,
            stabilization_delay,
            cycle,
            state: Arc::new(state),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Start the timer. `first` decides how the first cycle writes the record.
    ///
    /// Only an idle scheduler can start; later calls are ignored so there is
    /// never more than one timer.
    pub async fn start(&self, first: CycleKind) {
        let mut task = self.task.lock().await;
        let current = self.state();
        if current != SchedulerState::Idle {
            warn!(state = ?current, "Scheduler already started, ignoring");
            return;
        }

        self.state.send_replace(SchedulerState::AwaitingStabilization);
        debug!(delay_ms = self.stabilization_delay.as_millis() as u64, "Awaiting session stabilization");

        *task = Some(tokio::spawn(run(
            self.cycle.clone(),
            self.schedule,
            self.stabilization_delay,
            first,
            self.state.clone(),
            self.cancel.clone(),
        )));
    }

    /// Cancel future ticks and wait for an in-flight cycle to finish.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Scheduler task panicked");
            }
        }
        if self.state.send_replace(SchedulerState::Stopped) != SchedulerState::Stopped {
            info!("Backup scheduler stopped");
        }
    }
}

async fn run(
    cycle: Arc<SyncCycle>,
    schedule: SyncSchedule,
    stabilization_delay: Duration,
    first: CycleKind,
    state: Arc<watch::Sender<SchedulerState>>,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(stabilization_delay) => {}
    }

    // The first kind sticks until a cycle stores, so a failed create is
    // retried as a create and still notifies once.
    let mut pending = first;

    state.send_replace(SchedulerState::Running);
    // Failures are reported by the cycle; the schedule carries on.
    if let Ok(CycleOutcome::Stored { .. }) = cycle.run(pending).await {
        pending = CycleKind::Update;
    }
    if cancel.is_cancelled() {
        return;
    }
    state.send_replace(SchedulerState::Scheduled);

    let period = schedule.interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_ms = period.as_millis() as u64, "Backup scheduler running");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                state.send_replace(SchedulerState::Running);
                match cycle.try_run(pending).await {
                    Ok(CycleOutcome::Stored { .. }) => pending = CycleKind::Update,
                    Ok(CycleOutcome::Dropped) => debug!("Tick dropped"),
                    _ => {}
                }
                if cancel.is_cancelled() {
                    break;
                }
                state.send_replace(SchedulerState::Scheduled);
            }
        }
    }
}
