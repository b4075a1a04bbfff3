//! reqwest client for the streaming backend

use super::{AuthProvider, ErrorReport, SessionEndReport, StreamingApi};
use crate::{
    Error, Manifest, PlaybackRequest, PlaybackTarget, Result, SessionId, SessionSummary,
    WatchProgress,
};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Body of `POST /history/`
#[derive(Debug, Serialize)]
struct HistoryEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    episode: Option<u64>,
    /// Whole seconds
    progress: u64,
    completed: bool,
}

impl From<&WatchProgress> for HistoryEntry {
    fn from(progress: &WatchProgress) -> Self {
        let (content, episode) = match progress.target {
            PlaybackTarget::Content(id) => (Some(id.0), None),
            PlaybackTarget::Episode(id) => (None, Some(id.0)),
        };
        Self {
            content,
            episode,
            progress: progress.position_seconds.max(0.0).floor() as u64,
            completed: progress.completed,
        }
    }
}

/// Streaming backend reached over HTTPS with a bearer token
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    auth: Arc<dyn AuthProvider>,
}

impl HttpBackend {
    /// Create a backend rooted at `base_url` (e.g. `https://api.example.com/api/`)
    pub fn new(base_url: Url, auth: Arc<dyn AuthProvider>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, auth))
    }

    pub fn with_client(client: Client, mut base_url: Url, auth: Arc<dyn AuthProvider>) -> Self {
        // Url::join drops the last segment unless the base ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            client,
            base_url,
            auth,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::InvalidConfig(format!("bad endpoint {}: {}", path, e)))
    }

    /// Send an authenticated JSON POST and check the status
    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B, target: &str) -> Result<Response> {
        let token = self.auth.current_token().ok_or(Error::Unauthorized)?;
        let url = self.endpoint(path)?;

        debug!(url = %url, "POST");

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        check_status(response, target).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        target: &str,
    ) -> Result<T> {
        let response = self.post(path, body, target).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Map non-success statuses onto the error taxonomy
async fn check_status(response: Response, target: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(status_error(status, target, message))
}

fn status_error(status: StatusCode, target: &str, message: String) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Unauthorized,
        StatusCode::NOT_FOUND => Error::NotFound {
            target: target.to_string(),
        },
        s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT || s == StatusCode::TOO_MANY_REQUESTS => {
            Error::Network(format!("{}: {}", s, message))
        }
        s => Error::Http {
            status: s.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl StreamingApi for HttpBackend {
    #[instrument(skip(self), fields(target = %target))]
    async fn fetch_manifest(&self, target: PlaybackTarget) -> Result<Manifest> {
        let body = PlaybackRequest::from(target);
        let response = self.post("streaming/manifest/", &body, &target.to_string()).await?;
        let text = response.text().await?;
        Manifest::from_json(&text)
    }

    #[instrument(skip(self, report), fields(session = %session))]
    async fn end_session(&self, session: SessionId, report: &SessionEndReport) -> Result<SessionSummary> {
        let path = format!("streaming/sessions/{}/end_session/", session);
        self.post_json(&path, report, &format!("session {}", session)).await
    }

    #[instrument(skip(self, report), fields(session = %report.session))]
    async fn report_error(&self, report: &ErrorReport) -> Result<()> {
        self.post("streaming/errors/", report, &format!("session {}", report.session))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, progress), fields(target = %progress.target))]
    async fn save_progress(&self, progress: &WatchProgress) -> Result<()> {
        let entry = HistoryEntry::from(progress);
        self.post("history/", &entry, &progress.target.to_string()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::StaticToken;

    fn backend(base: &str) -> HttpBackend {
        HttpBackend::with_client(
            Client::new(),
            Url::parse(base).unwrap(),
            Arc::new(StaticToken::new(Some("t".into()))),
        )
    }

    #[test]
    fn test_endpoints_keep_base_path() {
        let backend = backend("https://api.example.com/api");
        assert_eq!(backend.base_url().as_str(), "https://api.example.com/api/");
        assert_eq!(
            backend.endpoint("streaming/sessions/7/end_session/").unwrap().as_str(),
            "https://api.example.com/api/streaming/sessions/7/end_session/"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "content 1", String::new()),
            Error::Unauthorized
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "content 1", String::new()),
            Error::NotFound { .. }
        ));
        assert!(status_error(StatusCode::BAD_GATEWAY, "content 1", String::new()).is_retryable());
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "content 1", "bad".into()),
            Error::Http { status: 400, .. }
        ));
    }

    #[test]
    fn test_history_entry_shape() {
        let progress = WatchProgress {
            target: PlaybackTarget::episode(12),
            position_seconds: 61.8,
            completed: false,
        };
        assert_eq!(
            serde_json::to_value(HistoryEntry::from(&progress)).unwrap(),
            serde_json::json!({ "episode": 12, "progress": 61, "completed": false })
        );
    }

    #[tokio::test]
    async fn test_missing_token_fails_before_sending() {
        let backend = HttpBackend::with_client(
            Client::new(),
            // Unroutable; a request attempt would surface as Network
            Url::parse("http://127.0.0.1:9/").unwrap(),
            Arc::new(StaticToken::new(None)),
        );
        let err = backend.fetch_manifest(PlaybackTarget::content(1)).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
    }
}
