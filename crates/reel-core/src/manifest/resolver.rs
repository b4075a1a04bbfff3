//! Manifest resolution with bounded retries

use super::Manifest;
use crate::{
    api::{AuthProvider, StreamingApi},
    config::RetryPolicy,
    Error, PlaybackTarget, Result,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Requests streaming manifests from the backend
///
/// Only transport failures are retried. A missing token fails before any
/// request is made; the caller has to re-authenticate and start over.
#[derive(Clone)]
pub struct ManifestResolver {
    api: Arc<dyn StreamingApi>,
    auth: Arc<dyn AuthProvider>,
    retry: RetryPolicy,
}

impl ManifestResolver {
    pub fn new(api: Arc<dyn StreamingApi>, auth: Arc<dyn AuthProvider>, retry: RetryPolicy) -> Self {
        Self { api, auth, retry }
    }

    /// Resolve the manifest for a target
    #[instrument(skip(self), fields(target = %target))]
    pub async fn resolve(&self, target: PlaybackTarget) -> Result<Manifest> {
        if self.auth.current_token().is_none() {
            warn!("No auth token, refusing to request manifest");
            return Err(Error::Unauthorized);
        }

        let mut attempt = 0;
        loop {
            attempt += 1;

            match self.api.fetch_manifest(target).await {
                Ok(manifest) => {
                    info!(
                        session_id = %manifest.session_id,
                        qualities = manifest.qualities.len(),
                        attempt,
                        "Manifest resolved"
                    );
                    return Ok(manifest);
                }
                Err(err) if err.is_retryable() && self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        error = %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Manifest request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    warn!(error = %err, code = err.error_code(), attempt, "Manifest resolution failed");
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{demo_manifest, BackendCall, Fault, MemoryBackend, StaticToken};
    use std::time::Duration;
    use tokio::time::Instant;

    fn resolver(backend: &Arc<MemoryBackend>, token: Option<&str>) -> ManifestResolver {
        ManifestResolver::new(
            backend.clone(),
            Arc::new(StaticToken::new(token.map(str::to_string))),
            RetryPolicy::default(),
        )
    }

    #[tokio::test]
    async fn test_resolve_success() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_manifest(PlaybackTarget::content(42), demo_manifest("Pilot"));

        let manifest = resolver(&backend, Some("t0k3n"))
            .resolve(PlaybackTarget::content(42))
            .await
            .unwrap();
        assert_eq!(manifest.title, "Pilot");
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_token_makes_no_request() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_manifest(PlaybackTarget::content(42), demo_manifest("Pilot"));

        let err = resolver(&backend, None)
            .resolve(PlaybackTarget::content(42))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_errors_retry_with_backoff() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_manifest(PlaybackTarget::episode(3), demo_manifest("Episode 3"));
        backend.fail_manifest(Fault::Network);
        backend.fail_manifest(Fault::Network);

        let started = Instant::now();
        let manifest = resolver(&backend, Some("t"))
            .resolve(PlaybackTarget::episode(3))
            .await
            .unwrap();

        assert_eq!(manifest.title, "Episode 3");
        assert_eq!(backend.calls().len(), 3);
        // 500ms + 1000ms
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_manifest(PlaybackTarget::content(1), demo_manifest("x"));
        for _ in 0..5 {
            backend.fail_manifest(Fault::Network);
        }

        let err = resolver(&backend, Some("t"))
            .resolve(PlaybackTarget::content(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert_eq!(backend.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_not_found_and_unauthorized_are_not_retried() {
        let backend = Arc::new(MemoryBackend::new());

        let err = resolver(&backend, Some("t"))
            .resolve(PlaybackTarget::content(404))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));

        backend.add_manifest(PlaybackTarget::content(5), demo_manifest("x"));
        backend.fail_manifest(Fault::Unauthorized);
        let err = resolver(&backend, Some("expired"))
            .resolve(PlaybackTarget::content(5))
            .await
            .unwrap_err();
        assert!(err.requires_auth());

        let fetches = backend
            .calls()
            .into_iter()
            .filter(|c| matches!(c, BackendCall::FetchManifest(_)))
            .count();
        assert_eq!(fetches, 2);
    }
}
