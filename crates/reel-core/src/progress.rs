//! Debounced watch-progress persistence
//!
//! Ticks arrive on the player's cadence; sends are spaced by at least the
//! configured interval and always carry the most recent position. One task
//! handle per tracker covers both the pending timer and the send it leads
//! to, and a send gate keeps sends for the session strictly sequential.

use crate::{api::StreamingApi, PlaybackTarget, WatchProgress};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Default)]
struct ProgressState {
    latest: Option<WatchProgress>,
    /// `latest` has not been persisted yet
    dirty: bool,
    /// Latched once any tick reported completion
    completed: bool,
    last_sent_at: Option<Instant>,
    in_flight: bool,
    /// Scheduled or running send task
    pending: Option<JoinHandle<()>>,
    generation: u64,
    sends: u64,
    failures: u64,
}

struct Shared {
    target: PlaybackTarget,
    api: Arc<dyn StreamingApi>,
    interval: Duration,
    duration_seconds: u64,
    completion_threshold: f64,
    state: Mutex<ProgressState>,
    send_gate: tokio::sync::Mutex<()>,
}

/// Per-session progress tracker
pub struct ProgressTracker {
    shared: Arc<Shared>,
}

/// Counters for logs and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressStats {
    pub sends: u64,
    pub failures: u64,
}

impl ProgressTracker {
    pub fn new(
        target: PlaybackTarget,
        api: Arc<dyn StreamingApi>,
        interval: Duration,
        duration_seconds: u64,
        completion_threshold: f64,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                target,
                api,
                interval,
                duration_seconds,
                completion_threshold,
                state: Mutex::new(ProgressState::default()),
                send_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Record the player position and persist it when the window allows
    ///
    /// Never waits on the network. Must be called within a tokio runtime.
    pub fn tick(&self, position_seconds: f64, completed: bool) {
        let mut state = self.shared.state.lock();
        self.shared.update(&mut state, position_seconds, completed);

        if state.pending.is_some() {
            // Coalesced into the pending send
            return;
        }

        let now = Instant::now();
        let wait = match state.last_sent_at {
            Some(last) => self.shared.interval.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        };
        Shared::schedule(&self.shared, &mut state, wait);
    }

    /// Record the position without scheduling a send
    pub fn record(&self, position_seconds: f64, completed: bool) {
        let mut state = self.shared.state.lock();
        self.shared.update(&mut state, position_seconds, completed);
    }

    /// Cancel the pending timer and persist the latest unsent progress now
    ///
    /// Best effort: returns false if the send failed.
    pub async fn flush(&self) -> bool {
        let _gate = self.shared.send_gate.lock().await;

        let progress = {
            let mut state = self.shared.state.lock();
            // Holding the gate: the pending task is sleeping or queued, not sending
            if let Some(handle) = state.pending.take() {
                handle.abort();
            }
            state.generation += 1;

            match (state.dirty, state.latest) {
                (true, Some(latest)) => {
                    state.dirty = false;
                    state.in_flight = true;
                    state.last_sent_at = Some(Instant::now());
                    latest
                }
                _ => return true,
            }
        };

        debug!(
            target = %self.shared.target,
            position = progress.position_seconds,
            completed = progress.completed,
            "Flushing progress"
        );

        let result = self.shared.api.save_progress(&progress).await;
        self.shared.finish_send(result.is_ok());
        if let Err(err) = result {
            warn!(error = %err, target = %self.shared.target, "Progress flush failed");
            return false;
        }
        true
    }

    pub fn latest(&self) -> Option<WatchProgress> {
        self.shared.state.lock().latest
    }

    pub fn last_sent_at(&self) -> Option<Instant> {
        self.shared.state.lock().last_sent_at
    }

    pub fn is_completed(&self) -> bool {
        self.shared.state.lock().completed
    }

    pub fn stats(&self) -> ProgressStats {
        let state = self.shared.state.lock();
        ProgressStats {
            sends: state.sends,
            failures: state.failures,
        }
    }

    /// Drop any scheduled send without persisting
    pub fn cancel(&self) {
        let mut state = self.shared.state.lock();
        if !state.in_flight {
            if let Some(handle) = state.pending.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl Shared {
    fn update(&self, state: &mut ProgressState, position_seconds: f64, completed: bool) {
        let position = position_seconds.max(0.0);
        let past_threshold = self.duration_seconds > 0
            && position >= self.duration_seconds as f64 * self.completion_threshold;

        state.completed |= completed || past_threshold;
        state.latest = Some(WatchProgress {
            target: self.target,
            position_seconds: position,
            completed: state.completed,
        });
        state.dirty = true;
    }

    /// Spawn the send task; caller holds the state lock so the handle is
    /// stored before the task can observe it
    fn schedule(shared: &Arc<Shared>, state: &mut ProgressState, wait: Duration) {
        state.generation += 1;
        let generation = state.generation;
        let task = Arc::clone(shared);
        state.pending = Some(tokio::spawn(async move {
            task.run_send(wait, generation).await;
        }));
    }

    async fn run_send(self: Arc<Self>, wait: Duration, generation: u64) {
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        let _gate = self.send_gate.lock().await;

        let progress = {
            let mut state = self.state.lock();
            match (state.dirty, state.latest) {
                (true, Some(latest)) => {
                    state.dirty = false;
                    state.in_flight = true;
                    state.last_sent_at = Some(Instant::now());
                    latest
                }
                _ => {
                    if state.generation == generation {
                        state.pending = None;
                    }
                    return;
                }
            }
        };

        let result = self.api.save_progress(&progress).await;
        let ok = result.is_ok();
        match result {
            Ok(()) => debug!(
                target = %self.target,
                position = progress.position_seconds,
                "Progress saved"
            ),
            // Superseded by the next tick
            Err(err) => warn!(error = %err, target = %self.target, "Progress save failed"),
        }

        self.finish_send(ok);

        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        state.pending = None;

        // Ticks that arrived mid-flight go out in the next window
        if ok && state.dirty {
            let wait = self.interval;
            Shared::schedule(&self, &mut state, wait);
        }
    }

    fn finish_send(&self, ok: bool) {
        let mut state = self.state.lock();
        state.in_flight = false;
        if ok {
            state.sends += 1;
        } else {
            state.failures += 1;
            state.dirty = true;
        }
    }
}
