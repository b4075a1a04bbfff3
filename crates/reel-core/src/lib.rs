//! Reel Core - Playback Session Coordinator
//!
//! This crate provides the client-side core of a video streaming player:
//! - Manifest resolution with bounded retries
//! - Session lifecycle as an explicit state machine
//! - Buffering and error telemetry for the end-of-session report
//! - Debounced watch-progress persistence
//! - Ordered, best-effort session termination
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Reel Core                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │   Manifest   │  │   Quality    │  │   Progress   │           │
//! │  │   Resolver   │  │   Policy     │  │   Tracker    │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │   Session   │                              │
//! │                    │   Machine   │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐            │
//! │  │  Telemetry   │  │ Coordinator │  │  Terminator  │            │
//! │  │  Aggregator  │  │    Queue    │  │              │            │
//! │  └──────────────┘  └─────────────┘  └──────────────┘            │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │ StreamingApi│  HTTP / in-memory            │
//! │                    └─────────────┘                              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod api;
pub mod manifest;
pub mod quality;
pub mod telemetry;
pub mod progress;
pub mod session;
pub mod terminator;
pub mod coordinator;

pub use error::{Error, Result};
pub use types::*;
pub use config::{CoordinatorConfig, RetryPolicy};
pub use api::{AuthProvider, HttpBackend, MemoryBackend, SharedToken, StaticToken, StreamingApi};
pub use manifest::{Manifest, ManifestResolver};
pub use quality::{HighestFittingBitrate, LowestBitrate, QualityPolicy};
pub use telemetry::{TelemetryAggregator, TelemetryEvent};
pub use progress::ProgressTracker;
pub use session::{PlayerEvent, SessionMachine, StopReason};
pub use terminator::{SessionTerminator, TerminationReport};
pub use coordinator::{CoordinatorUpdate, PlaybackCoordinator, PlayerHandle};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version once at startup
pub fn init() {
    tracing::info!(version = VERSION, "Reel Core initialized");
}
