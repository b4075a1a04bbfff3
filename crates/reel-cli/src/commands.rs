//! CLI command implementations

use crate::output;
use anyhow::{bail, Context};
use reel_core::api::demo_manifest;
use reel_core::{
    AuthProvider, CoordinatorConfig, CoordinatorUpdate, ErrorKind, HttpBackend, ManifestResolver,
    MemoryBackend, PlaybackCoordinator, PlaybackRequest, PlaybackTarget, StaticToken,
    StopReason, StreamingApi,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// Backend selected on the command line
pub struct Backend {
    api: Arc<dyn StreamingApi>,
    auth: Arc<dyn AuthProvider>,
    config: CoordinatorConfig,
    /// Set in offline mode so targets can be seeded on demand
    memory: Option<Arc<MemoryBackend>>,
}

impl Backend {
    pub fn from_cli(
        offline: bool,
        base_url: Url,
        token: Option<String>,
        config_path: Option<&Path>,
    ) -> anyhow::Result<Self> {
        let config = match config_path {
            Some(path) => CoordinatorConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => CoordinatorConfig::default(),
        };

        if offline {
            let memory = Arc::new(MemoryBackend::new());
            let token = token.unwrap_or_else(|| "offline".to_string());
            info!("Using in-memory backend");
            return Ok(Self {
                api: memory.clone(),
                auth: Arc::new(StaticToken::new(Some(token))),
                config,
                memory: Some(memory),
            });
        }

        if token.is_none() {
            warn!("No token given (--token or REEL_TOKEN); requests will be refused");
        }
        let auth: Arc<dyn AuthProvider> = Arc::new(StaticToken::new(token));
        let http = HttpBackend::new(base_url, auth.clone(), config.request_timeout())?;
        info!(base_url = %http.base_url(), "Using HTTP backend");

        Ok(Self {
            api: Arc::new(http),
            auth,
            config,
            memory: None,
        })
    }

    /// Make sure the in-memory backend has something to serve for `target`
    fn prepare(&self, target: PlaybackTarget) {
        if let Some(memory) = &self.memory {
            memory.add_manifest(target, demo_manifest(&format!("Demo {}", target)));
        }
    }
}

/// Resolve a manifest and print its tracks
pub async fn resolve(backend: &Backend, request: PlaybackRequest, format: &str) -> anyhow::Result<()> {
    let target = PlaybackTarget::try_from(request)?;
    backend.prepare(target);

    let resolver = ManifestResolver::new(
        backend.api.clone(),
        backend.auth.clone(),
        backend.config.retry.clone(),
    );
    let manifest = resolver
        .resolve(target)
        .await
        .with_context(|| format!("resolving {}", target))?;

    println!("{}", output::format_manifest(&manifest, format)?);
    Ok(())
}

/// Scripted player behaviour for `simulate`
pub struct Script {
    pub watch_seconds: u64,
    pub stalls_ms: Vec<u64>,
    pub quality: Option<u64>,
    pub errors: Vec<ErrorKind>,
    pub to_end: bool,
    pub tick_ms: u64,
}

/// Run one session end to end and print the termination report
pub async fn simulate(
    backend: &Backend,
    request: PlaybackRequest,
    script: Script,
    format: &str,
) -> anyhow::Result<()> {
    let target = PlaybackTarget::try_from(request)?;
    backend.prepare(target);

    let mut coordinator = PlaybackCoordinator::new(
        backend.api.clone(),
        backend.auth.clone(),
        backend.config.clone(),
    )?;

    coordinator.start(request).await?;
    match coordinator.process_next().await {
        Some(CoordinatorUpdate::Activated { session_id, .. }) => {
            info!(session_id = %session_id, "Playback started");
        }
        Some(CoordinatorUpdate::ResolutionFailed { error, .. }) => {
            bail!("playback could not start: {} ({})", error, error.error_code());
        }
        other => bail!("unexpected coordinator update: {:?}", other),
    }

    let player = coordinator.player_handle().context("no active session")?;
    let tick = Duration::from_millis(script.tick_ms);
    let mut stalls = script.stalls_ms.iter().copied();
    let errors_at = script.watch_seconds / 2;

    for second in 0..script.watch_seconds {
        player.progress(second as f64, false);

        if second == 1 {
            if let Some(quality) = script.quality {
                player.change_quality(quality);
            }
        }
        if second == errors_at {
            for kind in &script.errors {
                player.report_error(*kind, format!("simulated {} error", kind));
            }
        }
        if second % 3 == 2 {
            if let Some(stall) = stalls.next() {
                player.buffer_start();
                tokio::time::sleep(Duration::from_millis(stall)).await;
                player.buffer_end();
            }
        }

        if let Some(report) = drain(&mut coordinator).await {
            println!("{}", output::format_report(&report, format)?);
            return Ok(());
        }
        tokio::time::sleep(tick).await;
    }

    if script.to_end {
        player.stop(StopReason::EndOfContent);
    } else {
        player.progress(script.watch_seconds as f64, false);
        player.stop(StopReason::User);
    }

    match drain(&mut coordinator).await {
        Some(report) => println!("{}", output::format_report(&report, format)?),
        None => bail!("session did not terminate"),
    }
    Ok(())
}

/// Apply queued player events; returns the report if the session ended
async fn drain(coordinator: &mut PlaybackCoordinator) -> Option<reel_core::TerminationReport> {
    let mut terminated = None;
    for update in coordinator.process_events().await {
        match update {
            CoordinatorUpdate::Terminated(report) => terminated = Some(report),
            CoordinatorUpdate::Rejected { event, error } => {
                warn!(event, error = %error, "Player event rejected")
            }
            other => tracing::debug!(update = ?other, "Coordinator update"),
        }
    }
    terminated
}
