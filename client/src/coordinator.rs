//! Decides when the collection is re-fetched.
//!
//! At most one refresh runs at a time. Requests made while one is in flight are dropped,
//! not queued: the running refresh already reflects anything that confirmed before it was
//! issued, and the next tick picks up the rest.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::store::RefreshReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    Interval,
    Deleted,
    Shared,
    Approved,
    /// The presentation layer became visible again.
    ViewResumed,
    Manual,
}

#[derive(Debug)]
pub enum RefreshOutcome {
    Completed(RefreshReport),
    /// Another refresh was already in flight; nothing was fetched.
    Coalesced,
    Failed(EngineError),
}

#[derive(Clone)]
struct Gate {
    engine: Engine,
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag even if the refresh future is dropped midway.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Gate {
    async fn refresh(&self, reason: RefreshReason) -> RefreshOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(?reason, "refresh already in flight");
            return RefreshOutcome::Coalesced;
        }
        let _guard = InFlight(&self.in_flight);
        debug!(?reason, "refreshing");
        match self.engine.refresh().await {
            Ok(report) => RefreshOutcome::Completed(report),
            Err(err) => {
                warn!(?reason, %err, "refresh failed");
                RefreshOutcome::Failed(err)
            }
        }
    }
}

/// Shortest period the poll loop accepts.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct RefreshCoordinator {
    gate: Gate,
    interval: Duration,
}

impl RefreshCoordinator {
    pub fn new(engine: Engine, interval: Duration) -> Self {
        if interval < MIN_POLL_INTERVAL {
            warn!(?interval, minimum = ?MIN_POLL_INTERVAL, "poll interval too short, using the minimum");
        }
        Self {
            gate: Gate {
                engine,
                in_flight: Arc::new(AtomicBool::new(false)),
            },
            interval: interval.max(MIN_POLL_INTERVAL),
        }
    }

    /// Refreshes right away unless one is already running.
    pub async fn refresh_now(&self, reason: RefreshReason) -> RefreshOutcome {
        self.gate.refresh(reason).await
    }

    /// Starts the polling loop and wires it into the engine, so that confirmed deletes,
    /// shares and approvals request a refresh. The first refresh happens immediately.
    pub fn spawn(self) -> CoordinatorHandle {
        let (triggers, pending) = mpsc::unbounded_channel();
        self.gate.engine.attach_refresh_trigger(triggers.clone());
        let (shutdown, stop) = watch::channel(false);
        let gate = self.gate.clone();
        let task = tokio::spawn(run(self.gate, self.interval, pending, stop));
        CoordinatorHandle {
            gate,
            triggers,
            shutdown,
            task,
        }
    }
}

pub struct CoordinatorHandle {
    gate: Gate,
    triggers: mpsc::UnboundedSender<RefreshReason>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CoordinatorHandle {
    /// Asks the loop for a refresh without waiting for it.
    pub fn trigger(&self, reason: RefreshReason) {
        if self.triggers.send(reason).is_err() {
            debug!(?reason, "refresh loop has stopped");
        }
    }

    pub async fn refresh_now(&self, reason: RefreshReason) -> RefreshOutcome {
        self.gate.refresh(reason).await
    }

    /// Stops the loop and waits for it. A refresh in progress is allowed to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            warn!(%err, "refresh loop ended abnormally");
        }
    }
}

async fn run(
    gate: Gate,
    interval: Duration,
    mut pending: mpsc::UnboundedReceiver<RefreshReason>,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(?interval, "refresh loop started");
    loop {
        let reason = tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => RefreshReason::Interval,
            Some(reason) = pending.recv() => reason,
        };
        if let RefreshOutcome::Completed(report) = gate.refresh(reason).await {
            debug!(?reason, appended = report.appended, removed = report.removed, "refresh completed");
        }
        while let Ok(dropped) = pending.try_recv() {
            debug!(reason = ?dropped, "covered by the refresh just run");
        }
    }
    info!("refresh loop stopped");
}
