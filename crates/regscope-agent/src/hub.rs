//! Process-wide clarification registry.
//!
//! Sessions publish their pending question here and poll for the answer; a
//! host (CLI prompt, HTTP handler) polls for prompts and submits answers.
//! Each answer is consumed exactly once. Finished sessions are archived so
//! hosts can inspect them after the verdict is returned; the archive keeps
//! the most recent [`DEFAULT_ARCHIVE_CAPACITY`] snapshots unless configured
//! otherwise.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use regscope_core::clarification::{ClarificationRequest, ClarificationResponse};
use regscope_core::config::ClarificationConfig;
use regscope_core::session::AnalysisSession;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ClarificationError;

#[derive(Debug, Default)]
struct Slot {
    pending: Option<ClarificationRequest>,
    response: Option<ClarificationResponse>,
    last_retired: Option<Uuid>,
}

pub const DEFAULT_ARCHIVE_CAPACITY: usize = 256;

/// Finished-session snapshots, oldest evicted first.
#[derive(Debug)]
struct Archive {
    capacity: usize,
    order: VecDeque<Uuid>,
    sessions: HashMap<Uuid, AnalysisSession>,
}

impl Archive {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            sessions: HashMap::new(),
        }
    }

    fn insert(&mut self, session: AnalysisSession) {
        if self.capacity == 0 {
            return;
        }
        let id = session.session_id;
        if self.sessions.insert(id, session).is_some() {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.sessions.remove(&oldest);
                debug!(session_id = %oldest, "archived session evicted");
            }
        }
    }

    fn remove(&mut self, session_id: Uuid) -> Option<AnalysisSession> {
        let session = self.sessions.remove(&session_id)?;
        self.order.retain(|id| *id != session_id);
        Some(session)
    }
}

#[derive(Debug, Clone)]
pub struct ClarificationHub {
    slots: Arc<RwLock<HashMap<Uuid, Slot>>>,
    archive: Arc<RwLock<Archive>>,
}

impl Default for ClarificationHub {
    fn default() -> Self {
        Self::with_archive_capacity(DEFAULT_ARCHIVE_CAPACITY)
    }
}

impl ClarificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `capacity` finished sessions; 0 disables archiving.
    pub fn with_archive_capacity(capacity: usize) -> Self {
        Self {
            slots: Arc::default(),
            archive: Arc::new(RwLock::new(Archive::new(capacity))),
        }
    }

    pub async fn register(&self, session_id: Uuid) {
        self.slots.write().await.entry(session_id).or_default();
    }

    /// Make `request` the session's pending question, replacing any
    /// unanswered one.
    pub async fn publish(&self, request: &ClarificationRequest) {
        let mut slots = self.slots.write().await;
        let slot = slots.entry(request.session_id).or_default();
        if let Some(old) = slot.pending.replace(request.clone()) {
            debug!(session_id = %request.session_id, replaced = %old.id, "pending clarification replaced");
        }
        slot.response = None;
        info!(
            session_id = %request.session_id,
            request_id = %request.id,
            kind = %request.kind,
            "clarification published"
        );
    }

    /// The unanswered question for `session_id`, if any.
    pub async fn poll_for_prompt(&self, session_id: Uuid) -> Option<ClarificationRequest> {
        let slots = self.slots.read().await;
        let slot = slots.get(&session_id)?;
        match (&slot.pending, &slot.response) {
            (Some(request), None) => Some(request.clone()),
            _ => None,
        }
    }

    /// Sessions with an unanswered question.
    pub async fn waiting_sessions(&self) -> Vec<Uuid> {
        let slots = self.slots.read().await;
        let mut ids: Vec<Uuid> = slots
            .iter()
            .filter(|(_, s)| s.pending.is_some() && s.response.is_none())
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    pub async fn submit_response(
        &self,
        session_id: Uuid,
        request_id: Uuid,
        answer_text: &str,
    ) -> Result<(), ClarificationError> {
        let mut slots = self.slots.write().await;
        let slot = slots
            .get_mut(&session_id)
            .ok_or(ClarificationError::UnknownSession(session_id))?;
        if answer_text.trim().is_empty() {
            return Err(ClarificationError::EmptyAnswer);
        }
        let Some(pending) = &slot.pending else {
            if slot.last_retired == Some(request_id) {
                return Err(ClarificationError::AlreadyAnswered(request_id));
            }
            return Err(ClarificationError::NoPendingRequest(session_id));
        };
        if pending.id != request_id {
            if slot.last_retired == Some(request_id) {
                return Err(ClarificationError::AlreadyAnswered(request_id));
            }
            return Err(ClarificationError::RequestMismatch {
                expected: pending.id,
                got: request_id,
            });
        }
        if slot.response.is_some() {
            return Err(ClarificationError::AlreadyAnswered(request_id));
        }
        slot.response = Some(ClarificationResponse::human(pending, answer_text.trim()));
        info!(%session_id, %request_id, "clarification answer submitted");
        Ok(())
    }

    /// Consume the answer to `request_id`, retiring the request.
    pub async fn take_response(
        &self,
        session_id: Uuid,
        request_id: Uuid,
    ) -> Option<ClarificationResponse> {
        let mut slots = self.slots.write().await;
        let slot = slots.get_mut(&session_id)?;
        if slot.response.as_ref().map(|r| r.request_id) != Some(request_id) {
            return None;
        }
        slot.pending = None;
        slot.last_retired = Some(request_id);
        slot.response.take()
    }

    /// Withdraw `request_id`. An answer that raced in is returned instead of
    /// being dropped.
    pub async fn retire(&self, session_id: Uuid, request_id: Uuid) -> Option<ClarificationResponse> {
        let mut slots = self.slots.write().await;
        let slot = slots.get_mut(&session_id)?;
        if slot.pending.as_ref().map(|p| p.id) != Some(request_id) {
            return None;
        }
        slot.pending = None;
        slot.last_retired = Some(request_id);
        slot.response.take()
    }

    /// Poll until `request` is answered or the configured window elapses.
    ///
    /// The first check happens after one poll interval. After `max_polls`
    /// unanswered checks the configured timeout answer is injected.
    pub async fn await_response(
        &self,
        request: &ClarificationRequest,
        config: &ClarificationConfig,
    ) -> ClarificationResponse {
        let session_id = request.session_id;
        let mut ticker = tokio::time::interval(Duration::from_millis(config.poll_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        for poll in 1..=config.max_polls {
            ticker.tick().await;
            if let Some(response) = self.take_response(session_id, request.id).await {
                info!(
                    %session_id,
                    request_id = %request.id,
                    poll,
                    answer = %response.answer_text,
                    "clarification answered"
                );
                return response;
            }
        }

        if let Some(response) = self.retire(session_id, request.id).await {
            info!(%session_id, request_id = %request.id, "clarification answered at deadline");
            return response;
        }
        warn!(
            %session_id,
            request_id = %request.id,
            waited_secs = config.timeout().as_secs(),
            default_answer = %config.timeout_answer,
            "clarification timed out; applying default answer"
        );
        ClarificationResponse::timeout(request, config.timeout_answer.as_str())
    }

    /// Store the final snapshot of a session and drop its slot. The oldest
    /// snapshot is evicted once the archive is full.
    pub async fn archive(&self, session: &AnalysisSession) {
        self.slots.write().await.remove(&session.session_id);
        self.archive.write().await.insert(session.clone());
    }

    pub async fn archived(&self, session_id: Uuid) -> Option<AnalysisSession> {
        self.archive.read().await.sessions.get(&session_id).cloned()
    }

    /// Remove and return an archived snapshot.
    pub async fn take_archived(&self, session_id: Uuid) -> Option<AnalysisSession> {
        self.archive.write().await.remove(session_id)
    }

    pub async fn archived_count(&self) -> usize {
        self.archive.read().await.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regscope_core::clarification::{AnswerSource, ClarificationKind};
    use regscope_core::context::EnrichedContext;

    fn request(session_id: Uuid) -> ClarificationRequest {
        ClarificationRequest::new(
            session_id,
            ClarificationKind::GeographicScope,
            "Which regions?",
            vec!["Global (all regions)".into()],
            "",
        )
    }

    #[tokio::test]
    async fn submit_is_validated_and_consumed_once() {
        let hub = ClarificationHub::new();
        let sid = Uuid::now_v7();
        let stray = Uuid::now_v7();

        assert_eq!(
            hub.submit_response(sid, stray, "EU").await,
            Err(ClarificationError::UnknownSession(sid))
        );
        hub.register(sid).await;
        assert_eq!(
            hub.submit_response(sid, stray, "EU").await,
            Err(ClarificationError::NoPendingRequest(sid))
        );

        let req = request(sid);
        hub.publish(&req).await;
        assert_eq!(hub.poll_for_prompt(sid).await.map(|r| r.id), Some(req.id));
        assert_eq!(hub.waiting_sessions().await, vec![sid]);
        assert_eq!(
            hub.submit_response(sid, stray, "EU").await,
            Err(ClarificationError::RequestMismatch {
                expected: req.id,
                got: stray
            })
        );
        assert_eq!(
            hub.submit_response(sid, req.id, "   ").await,
            Err(ClarificationError::EmptyAnswer)
        );
        hub.submit_response(sid, req.id, " EU ").await.unwrap();
        assert!(hub.poll_for_prompt(sid).await.is_none());
        assert_eq!(
            hub.submit_response(sid, req.id, "Utah").await,
            Err(ClarificationError::AlreadyAnswered(req.id))
        );

        let resp = hub.take_response(sid, req.id).await.unwrap();
        assert_eq!(resp.answer_text, "EU");
        assert_eq!(resp.source, AnswerSource::Human);
        assert!(hub.take_response(sid, req.id).await.is_none());
        assert_eq!(
            hub.submit_response(sid, req.id, "Utah").await,
            Err(ClarificationError::AlreadyAnswered(req.id))
        );
        assert!(hub.waiting_sessions().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out_with_default() {
        let hub = ClarificationHub::new();
        let req = request(Uuid::now_v7());
        hub.publish(&req).await;

        let start = tokio::time::Instant::now();
        let resp = hub.await_response(&req, &ClarificationConfig::default()).await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(60) && waited < Duration::from_secs(61));
        assert_eq!(resp.source, AnswerSource::Timeout);
        assert_eq!(resp.answer_text, "All Regions");
        assert_eq!(resp.request_id, req.id);
        assert!(hub.poll_for_prompt(req.session_id).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn answer_arriving_mid_wait_is_returned() {
        let hub = ClarificationHub::new();
        let req = request(Uuid::now_v7());
        hub.publish(&req).await;

        let answering = hub.clone();
        let (sid, rid) = (req.session_id, req.id);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(4500)).await;
            answering.submit_response(sid, rid, "Utah").await.unwrap();
        });

        let start = tokio::time::Instant::now();
        let resp = hub.await_response(&req, &ClarificationConfig::default()).await;
        assert_eq!(resp.source, AnswerSource::Human);
        assert_eq!(resp.answer_text, "Utah");
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(5) && waited < Duration::from_secs(6));
    }

    #[tokio::test]
    async fn archive_drops_slot_and_keeps_snapshot() {
        let hub = ClarificationHub::new();
        let session = AnalysisSession::new("feat-1", EnrichedContext::default());
        hub.register(session.session_id).await;
        hub.archive(&session).await;
        assert_eq!(
            hub.submit_response(session.session_id, Uuid::now_v7(), "EU").await,
            Err(ClarificationError::UnknownSession(session.session_id))
        );
        let archived = hub.archived(session.session_id).await.unwrap();
        assert_eq!(archived.feature_id, "feat-1");
    }

    #[tokio::test]
    async fn archive_evicts_oldest_beyond_capacity() {
        let hub = ClarificationHub::with_archive_capacity(2);
        let sessions: Vec<AnalysisSession> = (0..3)
            .map(|i| AnalysisSession::new(format!("feat-{i}"), EnrichedContext::default()))
            .collect();
        for session in &sessions {
            hub.archive(session).await;
        }
        hub.archive(&sessions[2]).await;

        assert_eq!(hub.archived_count().await, 2);
        assert!(hub.archived(sessions[0].session_id).await.is_none());
        assert!(hub.archived(sessions[1].session_id).await.is_some());

        let taken = hub.take_archived(sessions[2].session_id).await.unwrap();
        assert_eq!(taken.feature_id, "feat-2");
        assert!(hub.archived(sessions[2].session_id).await.is_none());
        assert_eq!(hub.archived_count().await, 1);
    }

    #[tokio::test]
    async fn zero_capacity_disables_archive() {
        let hub = ClarificationHub::with_archive_capacity(0);
        let session = AnalysisSession::new("feat-1", EnrichedContext::default());
        hub.archive(&session).await;
        assert_eq!(hub.archived_count().await, 0);
    }
}
