//! Core types for Reel

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Catalog identifier of a movie or show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub u64);

/// Catalog identifier of a single episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodeId(pub u64);

/// Backend-assigned identifier of a streaming session
///
/// Opaque to the client. Only valid until the session it names is closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the user asked to play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackTarget {
    Content(ContentId),
    Episode(EpisodeId),
}

impl PlaybackTarget {
    pub fn content(id: u64) -> Self {
        PlaybackTarget::Content(ContentId(id))
    }

    pub fn episode(id: u64) -> Self {
        PlaybackTarget::Episode(EpisodeId(id))
    }
}

impl std::fmt::Display for PlaybackTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackTarget::Content(id) => write!(f, "content {}", id.0),
            PlaybackTarget::Episode(id) => write!(f, "episode {}", id.0),
        }
    }
}

/// Loose request shape as sent by callers and the manifest endpoint
///
/// Exactly one of the two fields must be set; convert into a
/// [`PlaybackTarget`] to get that guarantee.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<ContentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<EpisodeId>,
}

impl PlaybackRequest {
    pub fn content(id: u64) -> Self {
        Self {
            content_id: Some(ContentId(id)),
            episode_id: None,
        }
    }

    pub fn episode(id: u64) -> Self {
        Self {
            content_id: None,
            episode_id: Some(EpisodeId(id)),
        }
    }
}

impl TryFrom<PlaybackRequest> for PlaybackTarget {
    type Error = Error;

    fn try_from(request: PlaybackRequest) -> Result<Self> {
        match (request.content_id, request.episode_id) {
            (Some(content), None) => Ok(PlaybackTarget::Content(content)),
            (None, Some(episode)) => Ok(PlaybackTarget::Episode(episode)),
            (Some(_), Some(_)) => Err(Error::InvalidRequest(
                "content_id and episode_id are mutually exclusive".into(),
            )),
            (None, None) => Err(Error::InvalidRequest(
                "one of content_id or episode_id is required".into(),
            )),
        }
    }
}

impl From<PlaybackTarget> for PlaybackRequest {
    fn from(target: PlaybackTarget) -> Self {
        match target {
            PlaybackTarget::Content(id) => Self {
                content_id: Some(id),
                episode_id: None,
            },
            PlaybackTarget::Episode(id) => Self {
                content_id: None,
                episode_id: Some(id),
            },
        }
    }
}

/// One rendition of the asset in the quality ladder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoQuality {
    pub id: u64,
    /// Free-form label such as "1080p" or "1280x720"
    pub resolution: String,
    #[serde(rename = "video_url")]
    pub url: Url,
    #[serde(rename = "bitrate")]
    pub bitrate_kbps: u32,
    #[serde(rename = "file_size", default)]
    pub file_size_bytes: u64,
}

impl VideoQuality {
    /// Vertical pixel count derived from the resolution label (0 if unknown)
    pub fn rank(&self) -> u32 {
        crate::quality::resolution_rank(&self.resolution)
    }
}

/// Subtitle track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtitle {
    pub id: u64,
    pub language: String,
    #[serde(default)]
    pub language_display: String,
    #[serde(rename = "subtitle_url")]
    pub url: Url,
    #[serde(default)]
    pub is_default: bool,
}

/// Alternate audio track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub id: u64,
    pub language: String,
    #[serde(default)]
    pub language_display: String,
    #[serde(rename = "audio_url")]
    pub url: Url,
    #[serde(default)]
    pub is_default: bool,
}

/// Watch progress for resumption
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WatchProgress {
    pub target: PlaybackTarget,
    pub position_seconds: f64,
    pub completed: bool,
}

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing requested yet
    Idle,
    /// Waiting for the manifest
    Resolving,
    /// Playing (or paused) with media available
    Active,
    /// Player is stalled waiting for data
    Buffering,
    /// Final reconciliation in progress
    Ending,
    /// Terminated after a clean or aborted session
    Closed,
    /// Terminated because resolution or playback failed
    Failed,
}

impl SessionState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, target),
            // From Idle
            (Idle, Resolving) | (Idle, Closed) |
            // From Resolving (Closed when abandoned before the manifest arrived)
            (Resolving, Active) | (Resolving, Failed) | (Resolving, Closed) |
            // From Active
            (Active, Buffering) | (Active, Ending) |
            // From Buffering
            (Buffering, Active) | (Buffering, Ending) |
            // From Ending
            (Ending, Closed) | (Ending, Failed)
        )
    }

    /// Closed and Failed accept nothing further
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    /// A session exists and is still driven by the player
    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Active | SessionState::Buffering)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Resolving => write!(f, "resolving"),
            SessionState::Active => write!(f, "active"),
            SessionState::Buffering => write!(f, "buffering"),
            SessionState::Ending => write!(f, "ending"),
            SessionState::Closed => write!(f, "closed"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// How a session came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Stopped by the user or ran to the end
    Completed,
    /// Player destroyed, navigated away or superseded
    Aborted,
    /// A fatal playback error
    Failed,
}

impl SessionOutcome {
    /// Terminal state reached once termination has run
    pub fn final_state(&self) -> SessionState {
        match self {
            SessionOutcome::Completed | SessionOutcome::Aborted => SessionState::Closed,
            SessionOutcome::Failed => SessionState::Failed,
        }
    }
}

impl std::fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionOutcome::Completed => write!(f, "completed"),
            SessionOutcome::Aborted => write!(f, "aborted"),
            SessionOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// Categories accepted by the streaming error endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Playback,
    Buffering,
    Quality,
    Audio,
    Subtitle,
    Connection,
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Playback => "playback",
            ErrorKind::Buffering => "buffering",
            ErrorKind::Quality => "quality",
            ErrorKind::Audio => "audio",
            ErrorKind::Subtitle => "subtitle",
            ErrorKind::Connection => "connection",
            ErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "playback" => Ok(ErrorKind::Playback),
            "buffering" => Ok(ErrorKind::Buffering),
            "quality" => Ok(ErrorKind::Quality),
            "audio" => Ok(ErrorKind::Audio),
            "subtitle" => Ok(ErrorKind::Subtitle),
            "connection" => Ok(ErrorKind::Connection),
            "other" => Ok(ErrorKind::Other),
            other => Err(Error::InvalidConfig(format!("unknown error kind '{}'", other))),
        }
    }
}

/// Server-side record returned when a session is ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Zero when the backend leaves it out
    #[serde(default)]
    pub id: SessionId,
    #[serde(default)]
    pub quality: String,
    #[serde(default)]
    pub buffering_count: u32,
    #[serde(default)]
    pub buffering_duration: u64,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    /// Seconds between start and end as computed by the backend
    #[serde(default)]
    pub duration: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_requires_exactly_one_target() {
        assert_eq!(
            PlaybackTarget::try_from(PlaybackRequest::content(42)).unwrap(),
            PlaybackTarget::content(42)
        );
        assert_eq!(
            PlaybackTarget::try_from(PlaybackRequest::episode(7)).unwrap(),
            PlaybackTarget::episode(7)
        );

        let both = PlaybackRequest {
            content_id: Some(ContentId(1)),
            episode_id: Some(EpisodeId(2)),
        };
        assert!(matches!(
            PlaybackTarget::try_from(both),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            PlaybackTarget::try_from(PlaybackRequest::default()),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_request_wire_shape() {
        let json = serde_json::to_value(PlaybackRequest::from(PlaybackTarget::content(42))).unwrap();
        assert_eq!(json, serde_json::json!({ "content_id": 42 }));

        let json = serde_json::to_value(PlaybackRequest::episode(9)).unwrap();
        assert_eq!(json, serde_json::json!({ "episode_id": 9 }));
    }

    #[test]
    fn test_session_state_transitions() {
        use SessionState::*;

        assert!(Idle.can_transition_to(Resolving));
        assert!(Resolving.can_transition_to(Active));
        assert!(Resolving.can_transition_to(Failed));
        assert!(Active.can_transition_to(Buffering));
        assert!(Buffering.can_transition_to(Active));
        assert!(Buffering.can_transition_to(Ending));
        assert!(Ending.can_transition_to(Closed));
        assert!(Ending.can_transition_to(Failed));

        assert!(!Idle.can_transition_to(Active));
        assert!(!Resolving.can_transition_to(Ending));
        assert!(!Closed.can_transition_to(Active));
        assert!(!Failed.can_transition_to(Resolving));
        assert!(Closed.is_terminal() && Failed.is_terminal());
    }

    #[test]
    fn test_session_summary_without_id() {
        let summary: SessionSummary = serde_json::from_value(serde_json::json!({
            "start_time": "2024-05-01T20:00:00Z",
            "end_time": "2024-05-01T20:45:00Z",
            "duration": 2700
        }))
        .unwrap();
        assert_eq!(summary.id, SessionId::default());
        assert_eq!(summary.duration, 2700);
        assert!(summary.quality.is_empty());
    }

    #[test]
    fn test_error_kind_names() {
        assert_eq!(ErrorKind::Connection.to_string(), "connection");
        assert_eq!("Subtitle".parse::<ErrorKind>().unwrap(), ErrorKind::Subtitle);
        assert!("decoder".parse::<ErrorKind>().is_err());
        assert_eq!(
            serde_json::to_value(ErrorKind::Playback).unwrap(),
            serde_json::json!("playback")
        );
    }
}
