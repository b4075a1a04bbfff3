//! In-process backend
//!
//! Serves canned manifests, records every call and can be scripted to fail.
//! Backs the CLI's offline mode and the test suites.

use super::{ErrorReport, SessionEndReport, StreamingApi};
use crate::{
    AudioTrack, Error, Manifest, PlaybackTarget, Result, SessionId, SessionSummary, Subtitle,
    VideoQuality, WatchProgress,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Failure injected into the next matching call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    NotFound,
    Unauthorized,
    Network,
}

impl Fault {
    fn into_error(self, target: impl ToString) -> Error {
        match self {
            Fault::NotFound => Error::NotFound {
                target: target.to_string(),
            },
            Fault::Unauthorized => Error::Unauthorized,
            Fault::Network => Error::Network("injected fault".into()),
        }
    }
}

/// Call recorded by [`MemoryBackend`]
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    FetchManifest(PlaybackTarget),
    EndSession {
        session: SessionId,
        report: SessionEndReport,
    },
    ReportError(ErrorReport),
    SaveProgress(WatchProgress),
}

#[derive(Default)]
struct MemoryState {
    manifests: HashMap<PlaybackTarget, Manifest>,
    manifest_delays: HashMap<PlaybackTarget, Duration>,
    manifest_faults: VecDeque<Fault>,
    progress_faults: VecDeque<Fault>,
    end_session_faults: VecDeque<Fault>,
    error_faults: VecDeque<Fault>,
    progress_latency: Option<Duration>,
    next_session_id: u64,
    history: HashMap<PlaybackTarget, WatchProgress>,
    calls: Vec<BackendCall>,
}

/// Streaming backend living in memory
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                next_session_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Serve `manifest` for `target`; every fetch gets a fresh session id
    pub fn add_manifest(&self, target: PlaybackTarget, manifest: Manifest) {
        self.state.lock().manifests.insert(target, manifest);
    }

    /// Delay manifest responses for `target`
    pub fn delay_manifest(&self, target: PlaybackTarget, delay: Duration) {
        self.state.lock().manifest_delays.insert(target, delay);
    }

    /// Delay every progress save
    pub fn delay_progress(&self, delay: Duration) {
        self.state.lock().progress_latency = Some(delay);
    }

    pub fn fail_manifest(&self, fault: Fault) {
        self.state.lock().manifest_faults.push_back(fault);
    }

    pub fn fail_progress(&self, fault: Fault) {
        self.state.lock().progress_faults.push_back(fault);
    }

    pub fn fail_end_session(&self, fault: Fault) {
        self.state.lock().end_session_faults.push_back(fault);
    }

    pub fn fail_error_report(&self, fault: Fault) {
        self.state.lock().error_faults.push_back(fault);
    }

    /// Every call received so far, in arrival order
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().calls.clone()
    }

    pub fn progress_saves(&self) -> Vec<WatchProgress> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                BackendCall::SaveProgress(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    pub fn end_session_reports(&self) -> Vec<(SessionId, SessionEndReport)> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                BackendCall::EndSession { session, report } => Some((*session, report.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn error_reports(&self) -> Vec<ErrorReport> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                BackendCall::ReportError(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    /// Persisted watch history entry for `target`
    pub fn history(&self, target: PlaybackTarget) -> Option<WatchProgress> {
        self.state.lock().history.get(&target).copied()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamingApi for MemoryBackend {
    async fn fetch_manifest(&self, target: PlaybackTarget) -> Result<Manifest> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.push(BackendCall::FetchManifest(target));
            state.manifest_delays.get(&target).copied()
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if let Some(fault) = state.manifest_faults.pop_front() {
            return Err(fault.into_error(target));
        }

        let mut manifest = state
            .manifests
            .get(&target)
            .cloned()
            .ok_or_else(|| Fault::NotFound.into_error(target))?;

        manifest.session_id = SessionId(state.next_session_id);
        state.next_session_id += 1;

        debug!(target = %target, session_id = %manifest.session_id, "Serving manifest");
        Ok(manifest)
    }

    async fn end_session(&self, session: SessionId, report: &SessionEndReport) -> Result<SessionSummary> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::EndSession {
            session,
            report: report.clone(),
        });

        if let Some(fault) = state.end_session_faults.pop_front() {
            return Err(fault.into_error(format!("session {}", session)));
        }

        let now = Utc::now();
        Ok(SessionSummary {
            id: session,
            quality: report.quality.clone(),
            buffering_count: report.buffering_count,
            buffering_duration: report.buffering_duration_ms,
            start_time: now,
            end_time: Some(now),
            duration: 0,
        })
    }

    async fn report_error(&self, report: &ErrorReport) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::ReportError(report.clone()));

        match state.error_faults.pop_front() {
            Some(fault) => Err(fault.into_error(format!("session {}", report.session))),
            None => Ok(()),
        }
    }

    async fn save_progress(&self, progress: &WatchProgress) -> Result<()> {
        let latency = {
            let mut state = self.state.lock();
            state.calls.push(BackendCall::SaveProgress(*progress));
            state.progress_latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        if let Some(fault) = state.progress_faults.pop_front() {
            return Err(fault.into_error(progress.target));
        }
        state.history.insert(progress.target, *progress);
        Ok(())
    }
}

/// Three-rung manifest with English/Portuguese subtitles and two audio tracks
pub fn demo_manifest(title: &str) -> Manifest {
    let cdn = |path: &str| -> Url {
        Url::parse(&format!("https://cdn.reel.invalid/{}", path)).expect("static demo URL")
    };

    Manifest {
        session_id: SessionId(0),
        title: title.to_string(),
        description: String::new(),
        duration_seconds: 2_700,
        poster_url: Some(cdn("posters/demo.jpg")),
        qualities: vec![
            VideoQuality {
                id: 1,
                resolution: "480p".into(),
                url: cdn("video/480p.mp4"),
                bitrate_kbps: 800,
                file_size_bytes: 270_000_000,
            },
            VideoQuality {
                id: 2,
                resolution: "720p".into(),
                url: cdn("video/720p.mp4"),
                bitrate_kbps: 2_500,
                file_size_bytes: 843_750_000,
            },
            VideoQuality {
                id: 3,
                resolution: "1080p".into(),
                url: cdn("video/1080p.mp4"),
                bitrate_kbps: 5_000,
                file_size_bytes: 1_687_500_000,
            },
        ],
        subtitles: vec![
            Subtitle {
                id: 10,
                language: "en".into(),
                language_display: "English".into(),
                url: cdn("subs/en.vtt"),
                is_default: true,
            },
            Subtitle {
                id: 11,
                language: "pt-br".into(),
                language_display: "Português (Brasil)".into(),
                url: cdn("subs/pt-br.vtt"),
                is_default: false,
            },
        ],
        audio_tracks: vec![
            AudioTrack {
                id: 20,
                language: "en".into(),
                language_display: "English".into(),
                url: cdn("audio/en.aac"),
                is_default: true,
            },
            AudioTrack {
                id: 21,
                language: "es".into(),
                language_display: "Español".into(),
                url: cdn("audio/es.aac"),
                is_default: false,
            },
        ],
    }
}
