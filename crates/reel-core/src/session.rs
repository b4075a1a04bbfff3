//! Session state machine - lifecycle of one playback attempt
//!
//! Coordinates:
//! - Resolution result intake (stale responses discarded)
//! - Initial quality selection
//! - Buffering, quality, track and error events from the player
//! - Hand-off to the terminator
//!
//! Everything here is synchronous; network work happens in the progress
//! tracker's tasks and in the terminator.

use crate::{
    api::{SessionEndReport, StreamingApi},
    config::CoordinatorConfig,
    manifest::Manifest,
    progress::ProgressTracker,
    quality::{next_lower_quality, QualityPolicy},
    telemetry::{PlaybackError, TelemetryAggregator, TelemetryEvent, TelemetrySnapshot},
    Error, ErrorKind, PlaybackTarget, Result, SessionId, SessionOutcome, SessionState,
    VideoQuality,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Why the player stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// User pressed stop or closed the player UI
    User,
    /// Playback reached the end of the content
    EndOfContent,
}

/// Event posted by the player surface
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    BufferStart,
    BufferEnd,
    /// Switch to a specific rendition
    QualityChange { quality_id: u64 },
    /// Switch to the rendition ranked directly below the current one
    StepDownQuality,
    /// `None` turns subtitles off
    SelectSubtitle { subtitle_id: Option<u64> },
    SelectAudio { audio_id: u64 },
    Error { kind: ErrorKind, message: String },
    Progress { position_seconds: f64, completed: bool },
    Stop { reason: StopReason },
}

impl PlayerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEvent::BufferStart => "buffer_start",
            PlayerEvent::BufferEnd => "buffer_end",
            PlayerEvent::QualityChange { .. } => "quality_change",
            PlayerEvent::StepDownQuality => "step_down_quality",
            PlayerEvent::SelectSubtitle { .. } => "select_subtitle",
            PlayerEvent::SelectAudio { .. } => "select_audio",
            PlayerEvent::Error { .. } => "error",
            PlayerEvent::Progress { .. } => "progress",
            PlayerEvent::Stop { .. } => "stop",
        }
    }
}

/// What the owner has to do after an event was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    /// Run the terminator with this outcome
    Terminate(SessionOutcome),
}

/// Live, in-memory state of an active session
pub struct PlaybackSession {
    session_id: SessionId,
    target: PlaybackTarget,
    manifest: Manifest,
    current_quality: u64,
    selected_subtitle: Option<u64>,
    selected_audio: Option<u64>,
    started_at: Instant,
    position_seconds: Option<f64>,
    reached_end: bool,
    /// Qualities that produced connection errors
    unreachable_qualities: HashSet<u64>,
    telemetry: TelemetryAggregator,
    progress: Option<ProgressTracker>,
}

impl PlaybackSession {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn target(&self) -> PlaybackTarget {
        self.target
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Quality currently playing
    pub fn current_quality(&self) -> Option<&VideoQuality> {
        self.manifest.quality(self.current_quality)
    }

    pub fn selected_subtitle(&self) -> Option<u64> {
        self.selected_subtitle
    }

    pub fn selected_audio(&self) -> Option<u64> {
        self.selected_audio
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn position_seconds(&self) -> Option<f64> {
        self.position_seconds
    }

    pub fn buffering_count(&self) -> u32 {
        self.telemetry.snapshot().buffering_count
    }

    pub fn buffering_duration_ms(&self) -> u64 {
        self.telemetry.snapshot().buffering_duration_ms
    }

    pub fn last_progress_sent_at(&self) -> Option<Instant> {
        self.progress.as_ref().and_then(|p| p.last_sent_at())
    }

    pub fn telemetry(&self) -> &TelemetryAggregator {
        &self.telemetry
    }

    fn quality_label(&self) -> String {
        self.current_quality()
            .map(|q| q.resolution.clone())
            .unwrap_or_default()
    }
}

/// Everything the terminator needs, captured when a session starts ending
pub struct TerminationPlan {
    pub session_id: SessionId,
    pub target: PlaybackTarget,
    pub outcome: SessionOutcome,
    /// Position and completion to persist last
    pub final_progress: Option<(f64, bool)>,
    pub report: SessionEndReport,
    /// Errors handed over for reporting, already marked reported
    pub errors: Vec<PlaybackError>,
    pub snapshot: TelemetrySnapshot,
    pub progress: Option<ProgressTracker>,
}

/// State machine for one playback attempt
pub struct SessionMachine {
    state: SessionState,
    target: Option<PlaybackTarget>,
    /// Request sequence number this machine waits on
    sequence: u64,
    session: Option<PlaybackSession>,
    /// Outcome recorded when termination began
    outcome: Option<SessionOutcome>,
    api: Arc<dyn StreamingApi>,
    config: Arc<CoordinatorConfig>,
    policy: Arc<dyn QualityPolicy>,
}

impl SessionMachine {
    pub fn new(
        api: Arc<dyn StreamingApi>,
        config: Arc<CoordinatorConfig>,
        policy: Arc<dyn QualityPolicy>,
    ) -> Self {
        Self {
            state: SessionState::Idle,
            target: None,
            sequence: 0,
            session: None,
            outcome: None,
            api,
            config,
            policy,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn target(&self) -> Option<PlaybackTarget> {
        self.target
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.session_id)
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome
    }

    /// Whether events tagged with `session_id` belong to this machine
    pub fn accepts(&self, session_id: SessionId) -> bool {
        self.session_id() == Some(session_id)
    }

    /// Transition to new state
    fn set_state(&mut self, new_state: SessionState) -> Result<()> {
        let current = self.state;

        if !current.can_transition_to(new_state) {
            return Err(Error::InvalidState {
                state: current.to_string(),
                event: format!("transition to {}", new_state),
            });
        }

        self.state = new_state;
        info!(from = %current, to = %new_state, sequence = self.sequence, "State transition");

        Ok(())
    }

    /// `Idle -> Resolving` for request number `sequence`
    pub fn start(&mut self, target: PlaybackTarget, sequence: u64) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(Error::invalid_state(self.state, "start"));
        }
        self.set_state(SessionState::Resolving)?;
        self.target = Some(target);
        self.sequence = sequence;
        Ok(())
    }

    /// Consume the resolver's result for request `sequence`
    ///
    /// A result for any other request is discarded with
    /// [`Error::StaleResponse`] and leaves the machine untouched.
    pub fn on_resolved(&mut self, sequence: u64, result: Result<Manifest>) -> Result<SessionId> {
        if sequence != self.sequence || self.state != SessionState::Resolving {
            return Err(Error::StaleResponse {
                sequence,
                current: self.sequence,
            });
        }

        let manifest = match result {
            Ok(manifest) => manifest,
            Err(err) => {
                self.set_state(SessionState::Failed)?;
                self.outcome = Some(SessionOutcome::Failed);
                return Err(err);
            }
        };

        let target = self
            .target
            .ok_or_else(|| Error::invalid_state(self.state, "resolved"))?;

        let index = self
            .policy
            .initial_quality(&manifest.qualities, self.config.bandwidth_hint_kbps)
            .min(manifest.qualities.len().saturating_sub(1));
        let quality = manifest
            .qualities
            .get(index)
            .ok_or_else(|| Error::InvalidManifest("no video qualities".into()))?;

        let session_id = manifest.session_id;
        let progress = ProgressTracker::new(
            target,
            self.api.clone(),
            self.config.progress_interval(),
            manifest.duration_seconds,
            self.config.completion_threshold,
        );

        info!(
            session_id = %session_id,
            title = %manifest.title,
            quality = %quality.resolution,
            bitrate_kbps = quality.bitrate_kbps,
            policy = self.policy.name(),
            "Session active"
        );

        self.session = Some(PlaybackSession {
            session_id,
            target,
            current_quality: quality.id,
            selected_subtitle: manifest.default_subtitle().map(|s| s.id),
            selected_audio: manifest.default_audio_track().map(|a| a.id),
            manifest,
            started_at: Instant::now(),
            position_seconds: None,
            reached_end: false,
            unreachable_qualities: HashSet::new(),
            telemetry: TelemetryAggregator::new(),
            progress: Some(progress),
        });
        self.set_state(SessionState::Active)?;

        Ok(session_id)
    }

    /// Apply a player event observed at `at`
    pub fn apply(&mut self, event: PlayerEvent, at: Instant) -> Result<Effect> {
        if !self.state.is_live() {
            return Err(Error::invalid_state(self.state, event.name()));
        }
        let state = self.state;
        let config = self.config.clone();
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| Error::invalid_state(state, event.name()))?;

        match event {
            PlayerEvent::BufferStart => {
                if session.telemetry.record(TelemetryEvent::BufferStart, at) {
                    self.set_state(SessionState::Buffering)?;
                }
                Ok(Effect::None)
            }
            PlayerEvent::BufferEnd => {
                if session.telemetry.record(TelemetryEvent::BufferEnd, at) {
                    self.set_state(SessionState::Active)?;
                }
                Ok(Effect::None)
            }
            PlayerEvent::QualityChange { quality_id } => {
                if session.manifest.quality(quality_id).is_none() {
                    return Err(Error::UnknownTrack {
                        kind: "quality",
                        id: quality_id,
                    });
                }
                switch_quality(session, quality_id, at);
                Ok(Effect::None)
            }
            PlayerEvent::StepDownQuality => {
                let lower = next_lower_quality(&session.manifest.qualities, session.current_quality)
                    .map(|q| q.id);
                match lower {
                    Some(id) => switch_quality(session, id, at),
                    None => debug!(quality = session.current_quality, "Already at lowest quality"),
                }
                Ok(Effect::None)
            }
            PlayerEvent::SelectSubtitle { subtitle_id } => {
                if let Some(id) = subtitle_id {
                    if session.manifest.subtitle(id).is_none() {
                        return Err(Error::UnknownTrack { kind: "subtitle", id });
                    }
                }
                debug!(subtitle = ?subtitle_id, "Subtitle selected");
                session.selected_subtitle = subtitle_id;
                Ok(Effect::None)
            }
            PlayerEvent::SelectAudio { audio_id } => {
                if session.manifest.audio_track(audio_id).is_none() {
                    return Err(Error::UnknownTrack {
                        kind: "audio",
                        id: audio_id,
                    });
                }
                debug!(audio = audio_id, "Audio track selected");
                session.selected_audio = Some(audio_id);
                Ok(Effect::None)
            }
            PlayerEvent::Error { kind, message } => {
                let fatal = is_fatal(&config, session, kind);
                warn!(kind = %kind, fatal, message = %message, "Player error");
                session
                    .telemetry
                    .record(TelemetryEvent::PlaybackError { kind, message }, at);
                if fatal {
                    Ok(Effect::Terminate(SessionOutcome::Failed))
                } else {
                    Ok(Effect::None)
                }
            }
            PlayerEvent::Progress {
                position_seconds,
                completed,
            } => {
                session.position_seconds = Some(position_seconds);
                if let Some(progress) = &session.progress {
                    progress.tick(position_seconds, completed);
                }
                Ok(Effect::None)
            }
            PlayerEvent::Stop { reason } => {
                session.reached_end |= reason == StopReason::EndOfContent;
                Ok(Effect::Terminate(SessionOutcome::Completed))
            }
        }
    }

    /// Begin termination: `-> Ending`, capture everything still to report
    ///
    /// Returns `None` when there is nothing to reconcile: the machine was
    /// already terminating or terminated (idempotent), or no session was ever
    /// created, in which case it is closed on the spot.
    pub fn begin_termination(&mut self, outcome: SessionOutcome, at: Instant) -> Option<TerminationPlan> {
        match self.state {
            SessionState::Ending | SessionState::Closed | SessionState::Failed => {
                debug!(state = %self.state, "Termination already under way");
                return None;
            }
            SessionState::Idle | SessionState::Resolving => {
                let _ = self.set_state(SessionState::Closed);
                self.outcome = Some(SessionOutcome::Aborted);
                return None;
            }
            SessionState::Active | SessionState::Buffering => {}
        }

        let session = self.session.as_mut()?;
        session.telemetry.close_open_interval(at);

        let final_progress = if session.reached_end {
            Some((session.manifest.duration_seconds as f64, true))
        } else {
            session.position_seconds.map(|p| (p, false))
        };

        let snapshot = session.telemetry.snapshot();
        let report = SessionEndReport {
            quality: session.quality_label(),
            buffering_count: snapshot.buffering_count,
            buffering_duration_ms: snapshot.buffering_duration_ms,
        };
        let plan = TerminationPlan {
            session_id: session.session_id,
            target: session.target,
            outcome,
            final_progress,
            report,
            errors: session.telemetry.take_unreported_errors(),
            snapshot,
            progress: session.progress.take(),
        };

        self.outcome = Some(outcome);
        let _ = self.set_state(SessionState::Ending);
        Some(plan)
    }

    /// `Ending -> Closed/Failed` and release the session
    pub fn complete_termination(&mut self) {
        if self.state != SessionState::Ending {
            return;
        }
        let outcome = self.outcome.unwrap_or(SessionOutcome::Aborted);
        let _ = self.set_state(outcome.final_state());
        if let Some(session) = self.session.take() {
            info!(
                session_id = %session.session_id,
                outcome = %outcome,
                watched_ms = u64::try_from(session.started_at.elapsed().as_millis()).unwrap_or(u64::MAX),
                "Session released"
            );
        }
    }
}

fn switch_quality(session: &mut PlaybackSession, to: u64, at: Instant) {
    let from = session.current_quality;
    if from == to {
        return;
    }
    session
        .telemetry
        .record(TelemetryEvent::QualityChange { from, to }, at);
    session.current_quality = to;
    info!(from, to, "Quality changed");
}

/// Fatal kinds are configured; connection errors turn fatal once every
/// rendition has failed to connect
fn is_fatal(config: &CoordinatorConfig, session: &mut PlaybackSession, kind: ErrorKind) -> bool {
    if config.is_fatal(kind) {
        return true;
    }
    if kind != ErrorKind::Connection {
        return false;
    }
    session.unreachable_qualities.insert(session.current_quality);
    session
        .manifest
        .qualities
        .iter()
        .all(|q| session.unreachable_qualities.contains(&q.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{demo_manifest, MemoryBackend};
    use crate::quality::{HighestFittingBitrate, LowestBitrate};
    use std::time::Duration;

    fn machine() -> SessionMachine {
        machine_with(CoordinatorConfig::default(), Arc::new(HighestFittingBitrate))
    }

    fn machine_with(config: CoordinatorConfig, policy: Arc<dyn QualityPolicy>) -> SessionMachine {
        SessionMachine::new(Arc::new(MemoryBackend::new()), Arc::new(config), policy)
    }

    fn active_machine() -> SessionMachine {
        let mut machine = machine();
        machine.start(PlaybackTarget::content(42), 1).unwrap();
        let mut manifest = demo_manifest("Pilot");
        manifest.session_id = SessionId(7);
        machine.on_resolved(1, Ok(manifest)).unwrap();
        machine
    }

    #[tokio::test]
    async fn test_machine_creation() {
        let machine = machine();
        assert_eq!(machine.state(), SessionState::Idle);
        assert!(machine.session().is_none());
    }

    #[tokio::test]
    async fn test_resolve_to_active() {
        let machine = active_machine();
        assert_eq!(machine.state(), SessionState::Active);

        let session = machine.session().unwrap();
        assert_eq!(session.session_id(), SessionId(7));
        assert_eq!(session.current_quality().unwrap().resolution, "1080p");
        assert_eq!(session.selected_subtitle(), Some(10));
        assert_eq!(session.selected_audio(), Some(20));
        assert!(machine.accepts(SessionId(7)));
        assert!(!machine.accepts(SessionId(8)));
    }

    #[tokio::test]
    async fn test_bandwidth_hint_and_policy() {
        let config = CoordinatorConfig {
            bandwidth_hint_kbps: Some(3000),
            ..Default::default()
        };
        let mut machine = machine_with(config, Arc::new(HighestFittingBitrate));
        machine.start(PlaybackTarget::content(1), 1).unwrap();
        machine.on_resolved(1, Ok(demo_manifest("x"))).unwrap();
        assert_eq!(machine.session().unwrap().current_quality().unwrap().resolution, "720p");

        let mut machine = machine_with(CoordinatorConfig::default(), Arc::new(LowestBitrate));
        machine.start(PlaybackTarget::content(1), 1).unwrap();
        machine.on_resolved(1, Ok(demo_manifest("x"))).unwrap();
        assert_eq!(machine.session().unwrap().current_quality().unwrap().resolution, "480p");
    }

    #[tokio::test]
    async fn test_resolution_failure_is_terminal() {
        let mut machine = machine();
        machine.start(PlaybackTarget::content(1), 1).unwrap();

        let err = machine.on_resolved(1, Err(Error::Unauthorized)).unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
        assert_eq!(machine.state(), SessionState::Failed);
        assert!(machine.session().is_none());

        let err = machine.apply(PlayerEvent::BufferStart, Instant::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_stale_resolution_is_discarded() {
        let mut machine = machine();
        machine.start(PlaybackTarget::content(1), 5).unwrap();

        let err = machine.on_resolved(4, Ok(demo_manifest("old"))).unwrap_err();
        assert!(matches!(err, Error::StaleResponse { sequence: 4, current: 5 }));
        assert_eq!(machine.state(), SessionState::Resolving);
        assert!(machine.session().is_none());
    }

    #[tokio::test]
    async fn test_buffering_transitions() {
        let mut machine = active_machine();
        let t0 = Instant::now();

        machine.apply(PlayerEvent::BufferStart, t0).unwrap();
        assert_eq!(machine.state(), SessionState::Buffering);
        // Duplicate start is idempotent
        machine.apply(PlayerEvent::BufferStart, t0 + Duration::from_millis(500)).unwrap();
        machine.apply(PlayerEvent::BufferEnd, t0 + Duration::from_millis(2000)).unwrap();
        assert_eq!(machine.state(), SessionState::Active);
        // Unmatched end is ignored
        machine.apply(PlayerEvent::BufferEnd, t0 + Duration::from_millis(2500)).unwrap();

        let session = machine.session().unwrap();
        assert_eq!(session.buffering_count(), 1);
        assert_eq!(session.buffering_duration_ms(), 2000);
    }

    #[tokio::test]
    async fn test_quality_changes() {
        let mut machine = active_machine();
        let now = Instant::now();

        machine.apply(PlayerEvent::BufferStart, now).unwrap();
        machine.apply(PlayerEvent::QualityChange { quality_id: 1 }, now).unwrap();
        // Same state, counters untouched
        assert_eq!(machine.state(), SessionState::Buffering);
        assert_eq!(machine.session().unwrap().current_quality().unwrap().id, 1);

        let err = machine
            .apply(PlayerEvent::QualityChange { quality_id: 99 }, now)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownTrack { kind: "quality", id: 99 }));

        machine.apply(PlayerEvent::QualityChange { quality_id: 3 }, now).unwrap();
        machine.apply(PlayerEvent::StepDownQuality, now).unwrap();
        assert_eq!(machine.session().unwrap().current_quality().unwrap().resolution, "720p");
        assert_eq!(machine.session().unwrap().telemetry().quality_switches(), 3);
    }

    #[tokio::test]
    async fn test_track_selection() {
        let mut machine = active_machine();
        let now = Instant::now();

        machine.apply(PlayerEvent::SelectSubtitle { subtitle_id: Some(11) }, now).unwrap();
        machine.apply(PlayerEvent::SelectAudio { audio_id: 21 }, now).unwrap();
        assert_eq!(machine.session().unwrap().selected_subtitle(), Some(11));
        assert_eq!(machine.session().unwrap().selected_audio(), Some(21));

        machine.apply(PlayerEvent::SelectSubtitle { subtitle_id: None }, now).unwrap();
        assert_eq!(machine.session().unwrap().selected_subtitle(), None);

        assert!(machine.apply(PlayerEvent::SelectAudio { audio_id: 10 }, now).is_err());
    }

    #[tokio::test]
    async fn test_error_fatality() {
        let mut machine = active_machine();
        let now = Instant::now();
        let error = |kind| PlayerEvent::Error {
            kind,
            message: "boom".into(),
        };

        assert_eq!(machine.apply(error(ErrorKind::Subtitle), now).unwrap(), Effect::None);
        assert_eq!(machine.state(), SessionState::Active);
        assert_eq!(
            machine.apply(error(ErrorKind::Playback), now).unwrap(),
            Effect::Terminate(SessionOutcome::Failed)
        );
    }

    #[tokio::test]
    async fn test_connection_fatal_once_every_quality_failed() {
        let mut machine = active_machine();
        let now = Instant::now();
        let connection = || PlayerEvent::Error {
            kind: ErrorKind::Connection,
            message: "unreachable".into(),
        };

        // 1080p fails, step down, 720p fails, step down, 480p fails
        assert_eq!(machine.apply(connection(), now).unwrap(), Effect::None);
        machine.apply(PlayerEvent::StepDownQuality, now).unwrap();
        assert_eq!(machine.apply(connection(), now).unwrap(), Effect::None);
        machine.apply(PlayerEvent::StepDownQuality, now).unwrap();
        assert_eq!(
            machine.apply(connection(), now).unwrap(),
            Effect::Terminate(SessionOutcome::Failed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_termination_plan() {
        let mut machine = active_machine();
        let t0 = Instant::now();

        machine
            .apply(PlayerEvent::Progress { position_seconds: 120.0, completed: false }, t0)
            .unwrap();
        machine
            .apply(PlayerEvent::Error { kind: ErrorKind::Audio, message: "glitch".into() }, t0)
            .unwrap();
        machine.apply(PlayerEvent::BufferStart, t0).unwrap();

        let plan = machine
            .begin_termination(SessionOutcome::Completed, t0 + Duration::from_millis(400))
            .unwrap();
        assert_eq!(machine.state(), SessionState::Ending);
        assert_eq!(plan.session_id, SessionId(7));
        assert_eq!(plan.final_progress, Some((120.0, false)));
        assert_eq!(plan.report.quality, "1080p");
        assert_eq!(plan.report.buffering_count, 1);
        assert_eq!(plan.report.buffering_duration_ms, 400);
        assert_eq!(plan.errors.len(), 1);
        assert!(plan.progress.is_some());

        // Idempotent
        assert!(machine.begin_termination(SessionOutcome::Completed, t0).is_none());
        assert!(machine.apply(PlayerEvent::BufferEnd, t0).is_err());

        machine.complete_termination();
        assert_eq!(machine.state(), SessionState::Closed);
        assert!(machine.session().is_none());
    }

    #[tokio::test]
    async fn test_end_of_content_reports_completion() {
        let mut machine = active_machine();
        let now = Instant::now();

        let effect = machine
            .apply(PlayerEvent::Stop { reason: StopReason::EndOfContent }, now)
            .unwrap();
        assert_eq!(effect, Effect::Terminate(SessionOutcome::Completed));

        let plan = machine.begin_termination(SessionOutcome::Completed, now).unwrap();
        assert_eq!(plan.final_progress, Some((2700.0, true)));
    }

    #[tokio::test]
    async fn test_abort_while_resolving() {
        let mut machine = machine();
        machine.start(PlaybackTarget::episode(2), 3).unwrap();

        assert!(machine.begin_termination(SessionOutcome::Aborted, Instant::now()).is_none());
        assert_eq!(machine.state(), SessionState::Closed);

        // The late manifest cannot revive it
        assert!(machine.on_resolved(3, Ok(demo_manifest("late"))).is_err());
        assert!(machine.session().is_none());
    }
}
