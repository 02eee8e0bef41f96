//! Session driver: enrichment, pre-analysis clarification, the bounded
//! reasoning loop, and synthesis.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use regscope_ai::decision::{Decision, DecisionEngine};
use regscope_ai::enrich::EnrichmentEngine;
use regscope_ai::oracle::Oracle;
use regscope_core::clarification::{ClarificationAudit, ClarificationRequest, ClarificationResponse};
use regscope_core::config::RegscopeConfig;
use regscope_core::context::FeatureInput;
use regscope_core::error::SessionError;
use regscope_core::jurisdiction::JurisdictionVocabulary;
use regscope_core::session::{AnalysisSession, ResumePoint};
use regscope_core::verdict::ComplianceVerdict;
use regscope_search::{ToolOutcome, ToolRegistry};
use tracing::{info, warn};

use crate::cancel::CancellationFlag;
use crate::clarify::{
    ClarificationInterpreter, apply_interpretation, detect_ambiguity, follow_up_request,
    geographic_scope_request, request_for_question,
};
use crate::hub::ClarificationHub;
use crate::synth::{Synthesizer, error_verdict};

pub struct Orchestrator {
    config: RegscopeConfig,
    registry: ToolRegistry,
    vocabulary: JurisdictionVocabulary,
    enricher: EnrichmentEngine,
    decider: DecisionEngine,
    interpreter: ClarificationInterpreter,
    synthesizer: Synthesizer,
    hub: ClarificationHub,
}

impl Orchestrator {
    /// Build an orchestrator without an oracle. Every oracle-backed step
    /// then takes its deterministic fallback.
    pub fn new(config: RegscopeConfig, registry: ToolRegistry) -> Self {
        let mut vocabulary = JurisdictionVocabulary::builtin();
        registry.extend_vocabulary(&mut vocabulary);
        Self {
            enricher: EnrichmentEngine::new(&config.enrichment).with_vocabulary(vocabulary.clone()),
            decider: DecisionEngine::new(&config.reasoning),
            interpreter: ClarificationInterpreter::new(vocabulary.clone()),
            synthesizer: Synthesizer::new(config.synthesis.clone()),
            hub: ClarificationHub::new(),
            vocabulary,
            registry,
            config,
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn Oracle>) -> Self {
        self.enricher = self.enricher.with_oracle(oracle.clone());
        self.decider = self.decider.with_oracle(oracle.clone());
        self.interpreter = self.interpreter.with_oracle(oracle.clone());
        self.synthesizer = self.synthesizer.with_oracle(oracle);
        self
    }

    /// Share a hub with a host that answers clarifications.
    pub fn with_hub(mut self, hub: ClarificationHub) -> Self {
        self.hub = hub;
        self
    }

    pub fn hub(&self) -> &ClarificationHub {
        &self.hub
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn vocabulary(&self) -> &JurisdictionVocabulary {
        &self.vocabulary
    }

    pub fn config(&self) -> &RegscopeConfig {
        &self.config
    }

    pub async fn analyze(&self, input: &FeatureInput) -> ComplianceVerdict {
        self.analyze_with_cancel(input, &CancellationFlag::new()).await
    }

    pub async fn analyze_with_cancel(
        &self,
        input: &FeatureInput,
        cancel: &CancellationFlag,
    ) -> ComplianceVerdict {
        let started_at = Utc::now();
        let context = self.enricher.enrich(input).await;
        let session = AnalysisSession::new(input.resolved_id(), context)
            .with_started_at(started_at)
            .with_iteration_cap(self.config.reasoning.max_iterations);
        info!(
            session_id = %session.session_id,
            feature_id = %session.feature_id,
            feature = %session.enriched_context.original_feature_name,
            "session started"
        );
        let (_, verdict) = self.run_session(session, cancel).await;
        verdict
    }

    /// Drive `session` to a terminal state and synthesize its verdict.
    ///
    /// Accepts fresh sessions as well as ones restored while waiting for a
    /// clarification; those continue from their resume point. The final
    /// snapshot is archived in the hub and returned. A session that is
    /// already terminal is returned untouched with an error verdict.
    pub async fn run_session(
        &self,
        mut session: AnalysisSession,
        cancel: &CancellationFlag,
    ) -> (AnalysisSession, ComplianceVerdict) {
        if session.status().is_terminal() {
            let message = format!("session {} is already {}", session.session_id, session.status());
            warn!(session_id = %session.session_id, status = %session.status(), "refusing to rerun a finished session");
            let verdict = error_verdict(&session, &message);
            return (session, verdict);
        }

        let start = Instant::now();
        self.hub.register(session.session_id).await;

        let verdict = match self.drive(&mut session, cancel).await {
            Ok(()) => self.synthesizer.synthesize(&session).await,
            Err(e) => {
                let message = e.to_string();
                if let Err(err) = session.fail(message.as_str()) {
                    warn!(session_id = %session.session_id, error = %err, "session not marked failed");
                }
                error_verdict(&session, &message)
            }
        };

        info!(
            session_id = %session.session_id,
            status = %session.status(),
            iterations = session.iteration_count(),
            findings = session.collected_findings.len(),
            compliance_required = verdict.compliance_required,
            risk_level = verdict.risk_level,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "session finished"
        );
        self.hub.archive(&session).await;
        (session, verdict)
    }

    async fn drive(
        &self,
        session: &mut AnalysisSession,
        cancel: &CancellationFlag,
    ) -> Result<(), SessionError> {
        let phase = session.resume_point();
        let restored = session.pending_clarification().cloned();
        let resumed = restored.is_some();

        if let Some(request) = restored {
            info!(session_id = %session.session_id, resume_point = ?phase, "resuming suspended session");
            self.hub.publish(&request).await;
            let response = self.hub.await_response(&request, &self.config.clarification).await;
            if let Some(next) = self.resolve(session, &response).await? {
                self.clarify(session, next, phase).await?;
            }
        }

        if phase == ResumePoint::PreAnalysis && !resumed {
            self.pre_analysis(session).await?;
        }
        if phase != ResumePoint::Synthesis {
            self.reason(session, cancel).await?;
        }
        session.complete()
    }

    async fn pre_analysis(&self, session: &mut AnalysisSession) -> Result<(), SessionError> {
        let min_chars = self.config.clarification.min_description_chars;
        let Some(reason) = detect_ambiguity(&session.enriched_context, &self.vocabulary, min_chars)
        else {
            return Ok(());
        };
        info!(session_id = %session.session_id, %reason, "ambiguous feature");
        if !self.config.clarification.enabled {
            session
                .enriched_context
                .note(format!("ambiguous ({reason}); clarification disabled"));
            return Ok(());
        }
        let request = geographic_scope_request(
            session.session_id,
            &session.enriched_context,
            &self.registry.jurisdictions(),
            &reason,
        );
        self.clarify(session, request, ResumePoint::PreAnalysis).await
    }

    async fn reason(
        &self,
        session: &mut AnalysisSession,
        cancel: &CancellationFlag,
    ) -> Result<(), SessionError> {
        let tools = self.registry.list_available_tools();
        while session.has_iterations_left() {
            if cancel.is_cancelled() {
                info!(session_id = %session.session_id, iteration = session.iteration_count(), "session cancelled");
                session
                    .enriched_context
                    .note("analysis cancelled; finalized with the findings gathered so far");
                break;
            }
            let iteration = session.begin_iteration()?;

            match self.decider.decide_next_action(session, &tools).await {
                Decision::CallTool { tool, focus } => {
                    let outcome = self
                        .registry
                        .call_tool(&tool, &session.enriched_context, focus.as_deref())
                        .await;
                    match outcome {
                        ToolOutcome::Finding(finding) => session.record_finding(finding),
                        ToolOutcome::Error(message) => {
                            warn!(session_id = %session.session_id, iteration, %tool, error = %message, "no finding recorded");
                            session
                                .enriched_context
                                .note(format!("tool {tool} produced no finding: {message}"));
                        }
                    }
                }
                Decision::RequestClarification { question } => {
                    if !self.config.clarification.enabled {
                        session
                            .enriched_context
                            .note(format!("clarification skipped (disabled): {question}"));
                        continue;
                    }
                    let request = request_for_question(
                        session.session_id,
                        &question,
                        &session.enriched_context,
                        &self.registry.jurisdictions(),
                    );
                    self.clarify(session, request, ResumePoint::Reasoning).await?;
                }
                Decision::Finalize => break,
            }
        }
        Ok(())
    }

    /// Suspend on `request` and keep asking until an answer resolves.
    async fn clarify(
        &self,
        session: &mut AnalysisSession,
        request: ClarificationRequest,
        resume_point: ResumePoint,
    ) -> Result<(), SessionError> {
        let mut request = request;
        loop {
            session.suspend(request.clone(), resume_point)?;
            self.hub.publish(&request).await;
            let response = self.hub.await_response(&request, &self.config.clarification).await;
            match self.resolve(session, &response).await? {
                Some(next) => request = next,
                None => return Ok(()),
            }
        }
    }

    /// Resume with `response`, apply it to the context and audit it.
    /// Returns the follow-up request when the answer did not resolve.
    async fn resolve(
        &self,
        session: &mut AnalysisSession,
        response: &ClarificationResponse,
    ) -> Result<Option<ClarificationRequest>, SessionError> {
        let request = session.resume(response)?;
        let interpretation = self.interpreter.interpret(&request, response).await;
        let jurisdictions = self.registry.jurisdictions();
        let follow_up = follow_up_request(&request, &interpretation, &jurisdictions);
        let resolution = match &follow_up {
            Some(next) => format!("follow-up: {}", next.question),
            None => apply_interpretation(&mut session.enriched_context, &interpretation, &jurisdictions),
        };
        info!(
            session_id = %session.session_id,
            request_id = %request.id,
            source = response.source.as_str(),
            %resolution,
            "clarification resolved"
        );
        session.record_clarification(ClarificationAudit::new(&request, response, resolution));
        Ok(follow_up)
    }

    /// Analyze many features with bounded parallelism. Verdicts come back in
    /// input order.
    pub async fn analyze_batch(
        &self,
        features: &[FeatureInput],
        cancel: &CancellationFlag,
    ) -> Vec<ComplianceVerdict> {
        let limit = self.config.batch.max_concurrent_sessions.max(1);
        info!(features = features.len(), max_concurrent = limit, "batch started");
        let mut verdicts: Vec<(usize, ComplianceVerdict)> = stream::iter(features.iter().enumerate())
            .map(|(idx, input)| async move { (idx, self.analyze_with_cancel(input, cancel).await) })
            .buffer_unordered(limit)
            .collect()
            .await;
        verdicts.sort_by_key(|(idx, _)| *idx);
        verdicts.into_iter().map(|(_, v)| v).collect()
    }
}
