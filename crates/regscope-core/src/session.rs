//! Analysis session aggregate and its lifecycle state machine.
//!
//! ```text
//! Active ──suspend──▶ WaitingForClarification ──resume──▶ Active
//!   │                          │
//!   ├──complete──▶ Complete    └──fail──▶ Error
//!   └──fail──────▶ Error
//! ```
//!
//! `Complete` and `Error` are terminal. Iteration and retry counters live on
//! the aggregate so the state machine stays free of ambient state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::clarification::{ClarificationAudit, ClarificationRequest, ClarificationResponse};
use crate::context::EnrichedContext;
use crate::error::SessionError;
use crate::finding::JurisdictionFinding;

/// Hard cap on reasoning iterations per session.
pub const MAX_REASONING_ITERATIONS: u32 = 5;
/// Hard cap on enrichment retries per feature.
pub const MAX_ENRICHMENT_RETRIES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    WaitingForClarification,
    Complete,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::WaitingForClarification => "waiting_for_clarification",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    pub fn can_transition_to(&self, to: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (*self, to),
            (Active, WaitingForClarification)
                | (WaitingForClarification, Active)
                | (Active, Complete)
                | (Active, Error)
                | (WaitingForClarification, Error)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a suspended session picks up once its clarification resolves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumePoint {
    /// Ambiguity check before the first reasoning iteration.
    #[default]
    PreAnalysis,
    /// Inside the reasoning loop.
    Reasoning,
    /// Reasoning finished; only synthesis remains.
    Synthesis,
}

/// How a reasoning decision was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Labeled `ACTION_TYPE` / `DETAILS` fields.
    Structured,
    /// Keyword scan of free text.
    Keyword,
    /// Nothing parseable; defaulted to finalize.
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningLogEntry {
    pub iteration: u32,
    /// Tool name for tool calls, otherwise `clarify` or `finalize`.
    pub action: String,
    pub reasoning: String,
    pub source: DecisionSource,
    pub duration_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

impl ReasoningLogEntry {
    pub fn new(
        iteration: u32,
        action: impl Into<String>,
        reasoning: impl Into<String>,
        source: DecisionSource,
        duration_seconds: f64,
    ) -> Self {
        Self {
            iteration,
            action: action.into(),
            reasoning: reasoning.into(),
            source,
            duration_seconds,
            timestamp: Utc::now(),
        }
    }
}

/// State of one feature analysis, owned by the orchestrator for its lifetime.
///
/// Serialisable so a host can persist a suspended session together with its
/// [`ResumePoint`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSession {
    pub session_id: Uuid,
    pub feature_id: String,
    pub enriched_context: EnrichedContext,
    pub collected_findings: Vec<JurisdictionFinding>,
    pub reasoning_log: Vec<ReasoningLogEntry>,
    pub clarification_audit: Vec<ClarificationAudit>,
    pub started_at: DateTime<Utc>,
    iteration_count: u32,
    iteration_cap: u32,
    status: SessionStatus,
    pending_clarification: Option<ClarificationRequest>,
    resume_point: ResumePoint,
    error_message: Option<String>,
}

impl AnalysisSession {
    pub fn new(feature_id: impl Into<String>, enriched_context: EnrichedContext) -> Self {
        Self {
            session_id: Uuid::now_v7(),
            feature_id: feature_id.into(),
            enriched_context,
            collected_findings: Vec::new(),
            reasoning_log: Vec::new(),
            clarification_audit: Vec::new(),
            started_at: Utc::now(),
            iteration_count: 0,
            iteration_cap: MAX_REASONING_ITERATIONS,
            status: SessionStatus::Active,
            pending_clarification: None,
            resume_point: ResumePoint::PreAnalysis,
            error_message: None,
        }
    }

    /// Backdate the start, e.g. to when enrichment began.
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// Lower the iteration cap. Values above [`MAX_REASONING_ITERATIONS`] are clamped.
    pub fn with_iteration_cap(mut self, cap: u32) -> Self {
        self.iteration_cap = cap.clamp(1, MAX_REASONING_ITERATIONS);
        self
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn iteration_cap(&self) -> u32 {
        self.iteration_cap
    }

    pub fn remaining_iterations(&self) -> u32 {
        self.iteration_cap.saturating_sub(self.iteration_count)
    }

    pub fn has_iterations_left(&self) -> bool {
        self.iteration_count < self.iteration_cap
    }

    pub fn pending_clarification(&self) -> Option<&ClarificationRequest> {
        self.pending_clarification.as_ref()
    }

    pub fn resume_point(&self) -> ResumePoint {
        self.resume_point
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn elapsed_seconds(&self) -> f64 {
        let elapsed = Utc::now() - self.started_at;
        (elapsed.num_milliseconds().max(0) as f64) / 1000.0
    }

    /// Names of tools already invoked, in call order.
    pub fn tools_called(&self) -> Vec<&str> {
        self.reasoning_log
            .iter()
            .filter(|e| e.action != "clarify" && e.action != "finalize")
            .map(|e| e.action.as_str())
            .collect()
    }

    fn transition(&mut self, to: SessionStatus) -> Result<(), SessionError> {
        if !self.status.can_transition_to(to) {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        info!(
            session_id = %self.session_id,
            from = %self.status,
            to = %to,
            "session transition"
        );
        self.status = to;
        Ok(())
    }

    /// Start the next reasoning iteration. Returns its 1-based number.
    pub fn begin_iteration(&mut self) -> Result<u32, SessionError> {
        if self.status != SessionStatus::Active {
            return Err(SessionError::Other(format!(
                "cannot iterate while {}",
                self.status
            )));
        }
        if !self.has_iterations_left() {
            return Err(SessionError::IterationCapReached {
                cap: self.iteration_cap,
            });
        }
        self.iteration_count += 1;
        Ok(self.iteration_count)
    }

    /// Park the session on `request` until a response arrives.
    pub fn suspend(
        &mut self,
        request: ClarificationRequest,
        resume_point: ResumePoint,
    ) -> Result<(), SessionError> {
        if self.pending_clarification.is_some() {
            return Err(SessionError::ClarificationPending(self.session_id));
        }
        self.transition(SessionStatus::WaitingForClarification)?;
        self.pending_clarification = Some(request);
        self.resume_point = resume_point;
        Ok(())
    }

    /// Retire the pending request with `response` and return to `Active`.
    pub fn resume(
        &mut self,
        response: &ClarificationResponse,
    ) -> Result<ClarificationRequest, SessionError> {
        let expected = match &self.pending_clarification {
            Some(pending) => pending.id,
            None => return Err(SessionError::NoPendingClarification(self.session_id)),
        };
        if response.request_id != expected {
            return Err(SessionError::RequestMismatch {
                expected,
                got: response.request_id,
            });
        }
        self.transition(SessionStatus::Active)?;
        self.pending_clarification
            .take()
            .ok_or(SessionError::NoPendingClarification(self.session_id))
    }

    pub fn record_finding(&mut self, finding: JurisdictionFinding) {
        self.collected_findings.push(finding);
    }

    pub fn log(&mut self, entry: ReasoningLogEntry) {
        self.reasoning_log.push(entry);
    }

    pub fn record_clarification(&mut self, audit: ClarificationAudit) {
        self.clarification_audit.push(audit);
    }

    pub fn complete(&mut self) -> Result<(), SessionError> {
        self.resume_point = ResumePoint::Synthesis;
        self.transition(SessionStatus::Complete)
    }

    /// Move an active or waiting session into `Error`. Terminal sessions
    /// are rejected and keep their status and first message.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), SessionError> {
        let message = message.into();
        if !self.status.can_transition_to(SessionStatus::Error) {
            warn!(session_id = %self.session_id, status = %self.status, %message, "cannot fail a finished session");
            return Err(SessionError::InvalidTransition {
                from: self.status,
                to: SessionStatus::Error,
            });
        }
        warn!(session_id = %self.session_id, from = %self.status, %message, "session failed");
        self.status = SessionStatus::Error;
        self.pending_clarification = None;
        self.error_message = Some(message);
        Ok(())
    }
}
