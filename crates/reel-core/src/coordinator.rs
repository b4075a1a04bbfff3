//! Playback coordinator
//!
//! Owns at most one session at a time. Every input, from manifest
//! resolution results to player events, goes through a single queue and is
//! applied by the owner in arrival order, so session state is never touched
//! from two places at once.
//!
//! ```text
//!   start() ──► resolver task ──┐
//!                               ├──► queue ──► process_*() ──► SessionMachine
//!   PlayerHandle::* ────────────┘                                   │
//!                                                                   ▼
//!                                                          SessionTerminator
//! ```

use crate::{
    api::{AuthProvider, StreamingApi},
    config::CoordinatorConfig,
    manifest::{Manifest, ManifestResolver},
    quality::{HighestFittingBitrate, QualityPolicy},
    session::{Effect, PlaybackSession, PlayerEvent, SessionMachine, StopReason},
    terminator::{SessionTerminator, TerminationReport},
    Error, ErrorKind, PlaybackRequest, PlaybackTarget, Result, SessionId, SessionOutcome,
    SessionState,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

enum QueueItem {
    Resolved {
        sequence: u64,
        result: Result<Manifest>,
    },
    Player {
        session_id: SessionId,
        event: PlayerEvent,
        at: Instant,
    },
}

/// What processing the queue changed
#[derive(Debug)]
pub enum CoordinatorUpdate {
    /// Manifest arrived, session is playing
    Activated { sequence: u64, session_id: SessionId },
    /// Resolution failed, session is in `Failed`
    ResolutionFailed { sequence: u64, error: Error },
    /// A session ended and was reconciled with the backend
    Terminated(TerminationReport),
    /// Input for a request or session that is no longer current
    Discarded { reason: String },
    /// Player event not valid in the current state
    Rejected { event: &'static str, error: Error },
}

/// Sending side handed to the player surface
///
/// Every method is non-blocking; events are stamped with the time they were
/// sent and applied when the coordinator processes its queue.
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    session_id: SessionId,
    tx: mpsc::UnboundedSender<QueueItem>,
}

impl std::fmt::Debug for QueueItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueItem::Resolved { sequence, .. } => write!(f, "Resolved(#{})", sequence),
            QueueItem::Player { event, .. } => write!(f, "Player({})", event.name()),
        }
    }
}

impl PlayerHandle {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Post an event; false once the coordinator is gone
    pub fn send(&self, event: PlayerEvent) -> bool {
        self.tx
            .send(QueueItem::Player {
                session_id: self.session_id,
                event,
                at: Instant::now(),
            })
            .is_ok()
    }

    pub fn buffer_start(&self) -> bool {
        self.send(PlayerEvent::BufferStart)
    }

    pub fn buffer_end(&self) -> bool {
        self.send(PlayerEvent::BufferEnd)
    }

    pub fn change_quality(&self, quality_id: u64) -> bool {
        self.send(PlayerEvent::QualityChange { quality_id })
    }

    pub fn step_down_quality(&self) -> bool {
        self.send(PlayerEvent::StepDownQuality)
    }

    pub fn select_subtitle(&self, subtitle_id: Option<u64>) -> bool {
        self.send(PlayerEvent::SelectSubtitle { subtitle_id })
    }

    pub fn select_audio(&self, audio_id: u64) -> bool {
        self.send(PlayerEvent::SelectAudio { audio_id })
    }

    pub fn report_error(&self, kind: ErrorKind, message: impl Into<String>) -> bool {
        self.send(PlayerEvent::Error {
            kind,
            message: message.into(),
        })
    }

    pub fn progress(&self, position_seconds: f64, completed: bool) -> bool {
        self.send(PlayerEvent::Progress {
            position_seconds,
            completed,
        })
    }

    pub fn stop(&self, reason: StopReason) -> bool {
        self.send(PlayerEvent::Stop { reason })
    }
}

/// Coordinates playback sessions for one player
pub struct PlaybackCoordinator {
    id: Uuid,
    api: Arc<dyn StreamingApi>,
    config: Arc<CoordinatorConfig>,
    policy: Arc<dyn QualityPolicy>,
    resolver: ManifestResolver,
    terminator: SessionTerminator,
    machine: Option<SessionMachine>,
    /// Last issued request sequence number
    sequence: u64,
    tx: mpsc::UnboundedSender<QueueItem>,
    rx: mpsc::UnboundedReceiver<QueueItem>,
    /// Reconciliations started by `abort`
    background: Vec<JoinHandle<TerminationReport>>,
}

impl PlaybackCoordinator {
    /// Create a coordinator; the configuration is validated here
    pub fn new(
        api: Arc<dyn StreamingApi>,
        auth: Arc<dyn AuthProvider>,
        config: CoordinatorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        debug!(coordinator = %id, "Coordinator created");

        Ok(Self {
            id,
            resolver: ManifestResolver::new(api.clone(), auth, config.retry.clone()),
            terminator: SessionTerminator::new(api.clone()),
            api,
            config: Arc::new(config),
            policy: Arc::new(HighestFittingBitrate),
            machine: None,
            sequence: 0,
            tx,
            rx,
            background: Vec::new(),
        })
    }

    /// Replace the initial quality policy
    pub fn with_policy(mut self, policy: Arc<dyn QualityPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// State of the current session, `Idle` before the first start
    pub fn state(&self) -> SessionState {
        self.machine
            .as_ref()
            .map(|m| m.state())
            .unwrap_or(SessionState::Idle)
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.machine.as_ref().and_then(|m| m.session())
    }

    pub fn target(&self) -> Option<PlaybackTarget> {
        self.machine.as_ref().and_then(|m| m.target())
    }

    /// Sequence number of the most recent start
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Begin playback of a content item or an episode
    ///
    /// A session still live is terminated first, and its reconciliation is
    /// awaited before the new request is issued. Returns the request's
    /// sequence number; the outcome of resolution arrives through the queue.
    #[instrument(skip(self), fields(coordinator = %self.id))]
    pub async fn start(&mut self, request: PlaybackRequest) -> Result<u64> {
        let target = PlaybackTarget::try_from(request)?;

        if let Some(report) = self.terminate(SessionOutcome::Aborted).await {
            debug!(outcome = ?report.outcome, "Previous session reconciled");
        }

        self.sequence += 1;
        let sequence = self.sequence;

        let mut machine =
            SessionMachine::new(self.api.clone(), self.config.clone(), self.policy.clone());
        machine.start(target, sequence)?;
        self.machine = Some(machine);

        let resolver = self.resolver.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = resolver.resolve(target).await;
            // Receiver gone means the coordinator was dropped
            let _ = tx.send(QueueItem::Resolved { sequence, result });
        });

        info!(target = %target, sequence, "Playback requested");
        Ok(sequence)
    }

    /// Handle for the player surface of the current session
    pub fn player_handle(&self) -> Option<PlayerHandle> {
        let session_id = self.machine.as_ref()?.session_id()?;
        Some(PlayerHandle {
            session_id,
            tx: self.tx.clone(),
        })
    }

    /// Apply everything queued so far without waiting for more
    pub async fn process_events(&mut self) -> Vec<CoordinatorUpdate> {
        let mut updates = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            if let Some(update) = self.handle(item).await {
                updates.push(update);
            }
        }
        updates
    }

    /// Wait for the next queued input and apply it
    pub async fn process_next(&mut self) -> Option<CoordinatorUpdate> {
        let item = self.rx.recv().await?;
        self.handle(item).await
    }

    /// Terminate the current session and wait for reconciliation
    ///
    /// Returns `None` if there was nothing to terminate.
    pub async fn terminate(&mut self, outcome: SessionOutcome) -> Option<TerminationReport> {
        let machine = self.machine.as_mut()?;
        self.terminator.terminate(machine, outcome).await
    }

    /// Navigate away: end the session now, reconcile in the background
    ///
    /// Must be called within a tokio runtime.
    pub fn abort(&mut self) {
        let Some(machine) = self.machine.as_mut() else {
            return;
        };
        let Some(plan) = machine.begin_termination(SessionOutcome::Aborted, Instant::now()) else {
            return;
        };

        let terminator = self.terminator.clone();
        self.background.retain(|handle| !handle.is_finished());
        self.background
            .push(tokio::spawn(async move { terminator.execute(plan).await }));
        machine.complete_termination();
    }

    /// Abort the current session and wait for every background reconciliation
    pub async fn shutdown(&mut self) -> Vec<TerminationReport> {
        self.abort();

        let mut reports = Vec::new();
        for handle in self.background.drain(..) {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(err) => warn!(error = %err, "Background termination did not finish"),
            }
        }
        reports
    }

    async fn handle(&mut self, item: QueueItem) -> Option<CoordinatorUpdate> {
        match item {
            QueueItem::Resolved { sequence, result } => self.handle_resolved(sequence, result),
            QueueItem::Player {
                session_id,
                event,
                at,
            } => self.handle_player(session_id, event, at).await,
        }
    }

    fn handle_resolved(&mut self, sequence: u64, result: Result<Manifest>) -> Option<CoordinatorUpdate> {
        let Some(machine) = self.machine.as_mut() else {
            return Some(discarded(format!("response #{} with no session", sequence)));
        };

        match machine.on_resolved(sequence, result) {
            Ok(session_id) => Some(CoordinatorUpdate::Activated {
                sequence,
                session_id,
            }),
            Err(err @ Error::StaleResponse { .. }) => {
                info!(sequence, current = self.sequence, "Discarding stale manifest response");
                Some(discarded(err.to_string()))
            }
            Err(error) => {
                warn!(sequence, error = %error, code = error.error_code(), "Playback could not start");
                Some(CoordinatorUpdate::ResolutionFailed { sequence, error })
            }
        }
    }

    async fn handle_player(
        &mut self,
        session_id: SessionId,
        event: PlayerEvent,
        at: Instant,
    ) -> Option<CoordinatorUpdate> {
        let machine = match self.machine.as_mut() {
            Some(machine) if machine.accepts(session_id) => machine,
            _ => {
                debug!(session_id = %session_id, event = event.name(), "Event for another session");
                return Some(discarded(format!(
                    "{} event for session {}",
                    event.name(),
                    session_id
                )));
            }
        };

        let name = event.name();
        match machine.apply(event, at) {
            Ok(Effect::None) => None,
            Ok(Effect::Terminate(outcome)) => self
                .terminator
                .terminate(machine, outcome)
                .await
                .map(CoordinatorUpdate::Terminated),
            Err(error) => {
                debug!(event = name, error = %error, "Player event rejected");
                Some(CoordinatorUpdate::Rejected { event: name, error })
            }
        }
    }
}

impl Drop for PlaybackCoordinator {
    fn drop(&mut self) {
        // Reconciliation needs a runtime to run on
        if tokio::runtime::Handle::try_current().is_ok() {
            self.abort();
        }
    }
}

fn discarded(reason: String) -> CoordinatorUpdate {
    CoordinatorUpdate::Discarded { reason }
}
