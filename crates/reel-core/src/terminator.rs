//! Session termination
//!
//! Reconciles a session with the backend when it ends. Order matters:
//! final watch progress first, then the end-of-session report, then any
//! player errors not reported yet. Every step is best effort; a failure is
//! logged and the remaining steps still run.

use crate::{
    api::{ErrorReport, StreamingApi},
    session::{SessionMachine, TerminationPlan},
    SessionOutcome, SessionSummary,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

/// What the backend acknowledged for a terminated session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TerminationReport {
    pub outcome: Option<SessionOutcome>,
    /// Server-side summary when `end_session` succeeded
    pub summary: Option<SessionSummary>,
    pub progress_flushed: bool,
    pub end_report_sent: bool,
    pub errors_reported: usize,
    pub errors_failed: usize,
}

/// Runs termination plans against the backend
#[derive(Clone)]
pub struct SessionTerminator {
    api: Arc<dyn StreamingApi>,
}

impl SessionTerminator {
    pub fn new(api: Arc<dyn StreamingApi>) -> Self {
        Self { api }
    }

    /// Terminate the machine's session, end to end
    ///
    /// Returns `None` when there was nothing to do, including every call
    /// after the first.
    pub async fn terminate(
        &self,
        machine: &mut SessionMachine,
        outcome: SessionOutcome,
    ) -> Option<TerminationReport> {
        let plan = machine.begin_termination(outcome, Instant::now())?;
        let report = self.execute(plan).await;
        machine.complete_termination();
        Some(report)
    }

    /// Send everything a plan captured
    #[instrument(skip(self, plan), fields(session_id = %plan.session_id, outcome = %plan.outcome))]
    pub async fn execute(&self, plan: TerminationPlan) -> TerminationReport {
        let mut report = TerminationReport {
            outcome: Some(plan.outcome),
            ..Default::default()
        };

        if let Some(progress) = &plan.progress {
            if let Some((position, completed)) = plan.final_progress {
                progress.record(position, completed);
            }
            report.progress_flushed = progress.flush().await;
            progress.cancel();
        }

        match self.api.end_session(plan.session_id, &plan.report).await {
            Ok(summary) => {
                report.end_report_sent = true;
                report.summary = Some(summary);
            }
            Err(err) => warn!(error = %err, "End-of-session report failed"),
        }

        for error in plan.errors {
            let error_report = ErrorReport {
                session: plan.session_id,
                error_type: error.kind,
                error_message: error.message,
            };
            match self.api.report_error(&error_report).await {
                Ok(()) => report.errors_reported += 1,
                Err(err) => {
                    warn!(error = %err, kind = %error_report.error_type, "Error report failed");
                    report.errors_failed += 1;
                }
            }
        }

        info!(
            buffering_count = plan.report.buffering_count,
            buffering_ms = plan.report.buffering_duration_ms,
            quality = %plan.report.quality,
            progress_flushed = report.progress_flushed,
            end_report_sent = report.end_report_sent,
            errors_reported = report.errors_reported,
            "Session terminated"
        );

        report
    }
}
