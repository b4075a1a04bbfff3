//! Backend streaming API
//!
//! The coordinator only talks to the backend through [`StreamingApi`], so the
//! HTTP client can be swapped for the in-process [`MemoryBackend`].

mod http;
mod memory;

pub use http::HttpBackend;
pub use memory::{demo_manifest, BackendCall, Fault, MemoryBackend};

use crate::{ErrorKind, Manifest, PlaybackTarget, Result, SessionId, SessionSummary, WatchProgress};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Aggregated counters sent when a session ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEndReport {
    /// Resolution label of the quality playing at stop time
    pub quality: String,
    pub buffering_count: u32,
    /// Total time spent buffering, in milliseconds
    #[serde(rename = "buffering_duration")]
    pub buffering_duration_ms: u64,
}

/// A single playback error as accepted by the error endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub session: SessionId,
    pub error_type: ErrorKind,
    pub error_message: String,
}

/// Remote streaming service
#[async_trait]
pub trait StreamingApi: Send + Sync {
    /// `POST /streaming/manifest/`
    async fn fetch_manifest(&self, target: PlaybackTarget) -> Result<Manifest>;

    /// `POST /streaming/sessions/{id}/end_session/`
    async fn end_session(&self, session: SessionId, report: &SessionEndReport) -> Result<SessionSummary>;

    /// `POST /streaming/errors/`
    async fn report_error(&self, report: &ErrorReport) -> Result<()>;

    /// `POST /history/`, upserted per user and target
    async fn save_progress(&self, progress: &WatchProgress) -> Result<()>;
}

/// Source of the bearer token
pub trait AuthProvider: Send + Sync {
    /// Current token, `None` when signed out or expired
    fn current_token(&self) -> Option<String>;
}

/// Token fixed at construction
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token)
    }
}

impl AuthProvider for StaticToken {
    fn current_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Token that can be replaced after re-authentication
#[derive(Debug, Clone, Default)]
pub struct SharedToken(Arc<RwLock<Option<String>>>);

impl SharedToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.0.write() = Some(token.into());
    }

    pub fn clear(&self) {
        *self.0.write() = None;
    }
}

impl AuthProvider for SharedToken {
    fn current_token(&self) -> Option<String> {
        self.0.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_token_updates() {
        let token = SharedToken::new();
        let reader: Arc<dyn AuthProvider> = Arc::new(token.clone());
        assert!(reader.current_token().is_none());

        token.set("abc");
        assert_eq!(reader.current_token().as_deref(), Some("abc"));

        token.clear();
        assert!(reader.current_token().is_none());
    }

    #[test]
    fn test_end_report_wire_names() {
        let report = SessionEndReport {
            quality: "1080p".into(),
            buffering_count: 2,
            buffering_duration_ms: 5000,
        };
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({ "quality": "1080p", "buffering_count": 2, "buffering_duration": 5000 })
        );
    }
}
