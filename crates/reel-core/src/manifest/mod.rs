//! Streaming manifests and their resolution

mod resolver;

pub use resolver::ManifestResolver;

use crate::{AudioTrack, Error, Result, SessionId, Subtitle, VideoQuality};
use serde::{Deserialize, Serialize};
use url::Url;

/// Backend-issued description of a playable asset
///
/// Always validated: the quality, subtitle and audio lists are non-empty and
/// at most one subtitle and one audio track are marked default.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    /// Session identifier assigned by the backend
    pub session_id: SessionId,
    pub title: String,
    pub description: String,
    pub duration_seconds: u64,
    pub poster_url: Option<Url>,
    /// Quality ladder in manifest order
    pub qualities: Vec<VideoQuality>,
    pub subtitles: Vec<Subtitle>,
    pub audio_tracks: Vec<AudioTrack>,
}

/// Manifest as it appears on the wire
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestDocument {
    pub session_id: SessionId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub poster_url: Option<Url>,
    #[serde(default)]
    pub video_qualities: Vec<VideoQuality>,
    #[serde(default)]
    pub subtitles: Vec<Subtitle>,
    #[serde(default)]
    pub audio_tracks: Vec<AudioTrack>,
}

impl TryFrom<ManifestDocument> for Manifest {
    type Error = Error;

    fn try_from(doc: ManifestDocument) -> Result<Self> {
        if doc.video_qualities.is_empty() {
            return Err(Error::InvalidManifest("no video qualities".into()));
        }
        if doc.subtitles.is_empty() {
            return Err(Error::InvalidManifest("no subtitles".into()));
        }
        if doc.audio_tracks.is_empty() {
            return Err(Error::InvalidManifest("no audio tracks".into()));
        }
        if doc.subtitles.iter().filter(|s| s.is_default).count() > 1 {
            return Err(Error::InvalidManifest("more than one default subtitle".into()));
        }
        if doc.audio_tracks.iter().filter(|a| a.is_default).count() > 1 {
            return Err(Error::InvalidManifest("more than one default audio track".into()));
        }

        Ok(Manifest {
            session_id: doc.session_id,
            title: doc.title,
            description: doc.description,
            duration_seconds: doc.duration,
            poster_url: doc.poster_url,
            qualities: doc.video_qualities,
            subtitles: doc.subtitles,
            audio_tracks: doc.audio_tracks,
        })
    }
}

impl Manifest {
    /// Decode and validate a manifest from its JSON body
    pub fn from_json(body: &str) -> Result<Self> {
        let doc: ManifestDocument = serde_json::from_str(body)?;
        Manifest::try_from(doc)
    }

    pub fn quality(&self, id: u64) -> Option<&VideoQuality> {
        self.qualities.iter().find(|q| q.id == id)
    }

    pub fn subtitle(&self, id: u64) -> Option<&Subtitle> {
        self.subtitles.iter().find(|s| s.id == id)
    }

    pub fn audio_track(&self, id: u64) -> Option<&AudioTrack> {
        self.audio_tracks.iter().find(|a| a.id == id)
    }

    /// Subtitle marked default, if any (subtitles are off otherwise)
    pub fn default_subtitle(&self) -> Option<&Subtitle> {
        self.subtitles.iter().find(|s| s.is_default)
    }

    /// Audio track marked default, falling back to the first one
    pub fn default_audio_track(&self) -> Option<&AudioTrack> {
        self.audio_tracks
            .iter()
            .find(|a| a.is_default)
            .or_else(|| self.audio_tracks.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "session_id": 881,
        "title": "The Long Night",
        "description": "",
        "duration": 5400,
        "poster_url": null,
        "video_qualities": [
            {"id": 1, "resolution": "480p", "video_url": "https://cdn.example.com/480.mp4", "bitrate": 800, "file_size": 540000000},
            {"id": 2, "resolution": "1080p", "video_url": "https://cdn.example.com/1080.mp4", "bitrate": 5000, "file_size": 3375000000}
        ],
        "subtitles": [
            {"id": 10, "language": "en", "language_display": "English", "subtitle_url": "https://cdn.example.com/en.vtt", "is_default": true},
            {"id": 11, "language": "pt-br", "language_display": "Português", "subtitle_url": "https://cdn.example.com/pt.vtt", "is_default": false}
        ],
        "audio_tracks": [
            {"id": 20, "language": "en", "language_display": "English", "audio_url": "https://cdn.example.com/en.aac", "is_default": false}
        ]
    }"#;

    #[test]
    fn test_decode_manifest() {
        let manifest = Manifest::from_json(MANIFEST).unwrap();
        assert_eq!(manifest.session_id, SessionId(881));
        assert_eq!(manifest.duration_seconds, 5400);
        assert_eq!(manifest.qualities.len(), 2);
        assert_eq!(manifest.qualities[1].bitrate_kbps, 5000);
        assert_eq!(manifest.default_subtitle().unwrap().id, 10);
        // No default audio: first track
        assert_eq!(manifest.default_audio_track().unwrap().id, 20);
    }

    #[test]
    fn test_reject_empty_ladder() {
        let mut value: serde_json::Value = serde_json::from_str(MANIFEST).unwrap();
        value["video_qualities"] = serde_json::json!([]);
        let err = Manifest::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, Error::InvalidManifest(_)));
    }

    #[test]
    fn test_reject_two_default_subtitles() {
        let mut value: serde_json::Value = serde_json::from_str(MANIFEST).unwrap();
        value["subtitles"][1]["is_default"] = serde_json::json!(true);
        let err = Manifest::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, Error::InvalidManifest(_)));
    }

    #[test]
    fn test_malformed_body_is_decode_error() {
        assert!(matches!(Manifest::from_json("{\"title\": 3}"), Err(Error::Decode(_))));
    }
}
