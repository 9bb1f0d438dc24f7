//! Escalation from the automated flow to a live representative.
//!
//! A transfer spans several independent call-control callbacks:
//!
//! 1. The conversation escalates: [`TransferManager::request_transfer`] writes a
//!    [`TransferIntent`] for the call.
//! 2. The provider redirects the call: [`TransferManager::resume`] reads the
//!    intent and answers with a dial toward the representative.
//! 3. The dial finishes: [`TransferManager::on_dial_result`] either ends the
//!    flow or, when nobody answered, puts the caller in the [`HoldQueue`].
//! 4. A representative frees up: [`TransferManager::dequeue_next`] pops the
//!    head of the queue and points its intent at that representative.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::core::call_state::{CallSession, CallStateStore, StoreError, TransferIntent};
use crate::utils::phone_validation::validate_phone_number;

use super::hold_queue::HoldQueue;

#[derive(Debug, Clone, PartialEq)]
pub struct TransferConfig {
    /// Dialed when the caller's provider has no representative of its own.
    pub default_representative: Option<String>,
    /// How long a representative may ring before the caller is queued.
    pub representative_timeout: Duration,
    pub intent_ttl: Duration,
    /// Interval between position announcements while on hold.
    pub hold_announcement_interval: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            default_representative: None,
            representative_timeout: Duration::from_secs(20),
            intent_ttl: Duration::from_secs(120),
            hold_announcement_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("Call {0} is not active")]
    UnknownCall(String),

    #[error("Invalid representative number: {0}")]
    InvalidRepresentative(String),

    #[error("No representative number available")]
    NoRepresentative,
}

impl From<StoreError> for TransferError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(call_id) | StoreError::VersionConflict { call_id, .. } => {
                TransferError::UnknownCall(call_id)
            }
        }
    }
}

/// What the call-control layer should do next for a transferring call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferInstruction {
    Dial {
        target: String,
        timeout: Duration,
        caller_id: Option<String>,
    },
    Hold {
        position: usize,
    },
    /// No live intent: the transfer expired or never existed.
    NoIntent,
}

/// Outcome reported by the provider after a dial attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DialStatus {
    Completed,
    Answered,
    Busy,
    NoAnswer,
    Failed,
    Canceled,
}

impl DialStatus {
    /// Lenient parse of a provider status string; anything unknown is a failure.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "completed" => DialStatus::Completed,
            "answered" | "in-progress" => DialStatus::Answered,
            "busy" => DialStatus::Busy,
            "no-answer" => DialStatus::NoAnswer,
            "canceled" | "cancelled" => DialStatus::Canceled,
            _ => DialStatus::Failed,
        }
    }

    pub fn was_answered(&self) -> bool {
        matches!(self, DialStatus::Completed | DialStatus::Answered)
    }
}

pub struct TransferManager {
    store: Arc<CallStateStore>,
    queue: Arc<HoldQueue>,
    config: TransferConfig,
}

impl TransferManager {
    pub fn new(store: Arc<CallStateStore>, queue: Arc<HoldQueue>, config: TransferConfig) -> Self {
        Self {
            store,
            queue,
            config,
        }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<HoldQueue> {
        &self.queue
    }

    /// Representative for the session: its provider's number, else the default.
    fn representative_for(&self, session: &CallSession) -> Option<String> {
        let candidate = session
            .identity
            .as_ref()
            .and_then(|identity| identity.provider.representative_phone.clone())
            .or_else(|| self.config.default_representative.clone())?;
        match validate_phone_number(&candidate) {
            Ok(number) => Some(number),
            Err(reason) => {
                warn!(call_id = %session.call_id, number = %candidate, %reason, "Ignoring invalid representative number");
                None
            }
        }
    }

    /// Records the call's transfer intent.
    pub fn request_transfer(&self, session: &CallSession) -> Result<TransferIntent, TransferError> {
        let target = self.representative_for(session);
        let intent = TransferIntent::new(
            target.clone(),
            session.caller_phone.clone(),
            self.config.intent_ttl,
        );
        self.store.put_intent(&session.call_id, intent.clone())?;
        info!(
            call_id = %session.call_id,
            target = target.as_deref().unwrap_or("hold"),
            reason = ?session.escalation,
            "Transfer requested"
        );
        Ok(intent)
    }

    /// Next step for a call arriving at the transfer callback.
    pub fn resume(&self, call_id: &str) -> TransferInstruction {
        let Some(intent) = self.store.get_intent(call_id) else {
            return TransferInstruction::NoIntent;
        };
        match intent.target {
            Some(target) => TransferInstruction::Dial {
                target,
                timeout: self.config.representative_timeout,
                caller_id: intent.caller_phone,
            },
            None => self.hold(call_id),
        }
    }

    fn hold(&self, call_id: &str) -> TransferInstruction {
        let position = self.queue.enqueue(call_id);
        // Waiting callers keep their session alive.
        if let Err(err) = self.store.touch(call_id, None) {
            warn!(call_id, error = %err, "Held call has no session");
        }
        TransferInstruction::Hold { position }
    }

    /// Applies a dial outcome. Unanswered dials queue the caller.
    pub fn on_dial_result(&self, call_id: &str, status: DialStatus) -> TransferInstruction {
        if status.was_answered() {
            info!(call_id, ?status, "Representative connected");
            self.finish(call_id);
            return TransferInstruction::NoIntent;
        }
        if self.store.get_intent(call_id).is_none() {
            warn!(call_id, ?status, "Dial failed after transfer intent expired");
            return TransferInstruction::NoIntent;
        }
        info!(call_id, ?status, "Representative did not answer; queueing caller");
        self.hold(call_id)
    }

    pub fn hold_position(&self, call_id: &str) -> Option<usize> {
        self.queue.position(call_id)
    }

    /// Frees the call's hold slot; returns whether it held one.
    pub fn release(&self, call_id: &str) -> bool {
        self.queue.remove(call_id)
    }

    /// Ends the transfer: drops the slot, the intent and the session.
    pub fn finish(&self, call_id: &str) {
        self.release(call_id);
        self.store.delete(call_id);
    }

    /// Hands the longest-waiting live caller to `representative`.
    ///
    /// Callers whose session expired while waiting are skipped.
    pub fn dequeue_next(&self, representative: Option<&str>) -> Result<Option<String>, TransferError> {
        let target = representative
            .map(str::to_string)
            .or_else(|| self.config.default_representative.clone())
            .ok_or(TransferError::NoRepresentative)?;
        let target = validate_phone_number(&target).map_err(TransferError::InvalidRepresentative)?;

        while let Some(call_id) = self.queue.dequeue() {
            let Some(current) = self.store.get(&call_id) else {
                warn!(call_id = %call_id, "Skipping expired caller in hold queue");
                continue;
            };
            let intent = TransferIntent::new(
                Some(target.clone()),
                current.session.caller_phone.clone(),
                self.config.intent_ttl,
            );
            self.store.put_intent(&call_id, intent)?;
            info!(call_id = %call_id, representative = %target, "Caller dequeued");
            return Ok(Some(call_id));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::call_state::Phase;
    use crate::core::directory::{Identity, ProviderContext};

    fn setup(default_rep: Option<&str>) -> (Arc<CallStateStore>, TransferManager) {
        let store = Arc::new(CallStateStore::new(Duration::from_secs(900)));
        let manager = TransferManager::new(
            store.clone(),
            Arc::new(HoldQueue::new()),
            TransferConfig {
                default_representative: default_rep.map(str::to_string),
                ..Default::default()
            },
        );
        (store, manager)
    }

    #[test]
    fn test_dial_status_parse_is_lenient() {
        assert_eq!(DialStatus::parse("no-answer"), DialStatus::NoAnswer);
        assert_eq!(DialStatus::parse("NO_ANSWER"), DialStatus::NoAnswer);
        assert_eq!(DialStatus::parse("completed"), DialStatus::Completed);
        assert_eq!(DialStatus::parse("cancelled"), DialStatus::Canceled);
        assert_eq!(DialStatus::parse("exploded"), DialStatus::Failed);
        assert_eq!(DialStatus::parse(""), DialStatus::Failed);
    }

    fn session(call_id: &str, rep: Option<&str>) -> CallSession {
        let mut session = CallSession::new(call_id, Some("+15551230000".to_string()));
        session.phase = Phase::TransferRequested;
        session.identity = Some(Identity {
            employee_id: "e1".to_string(),
            first_name: "Dana".to_string(),
            phone: None,
            provider: ProviderContext {
                id: "p1".to_string(),
                name: "Northside".to_string(),
                representative_phone: rep.map(str::to_string),
            },
        });
        session
    }

    fn register(store: &CallStateStore, session: &CallSession) {
        store.put(&session.call_id, session.clone(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_representative_is_dialed() {
        let (store, manager) = setup(Some("+15550000000"));
        let session = session("CA1", Some("+1 555 987 0000"));
        register(&store, &session);

        let intent = manager.request_transfer(&session).unwrap();
        assert_eq!(intent.target.as_deref(), Some("+15559870000"));
        assert_eq!(
            manager.resume("CA1"),
            TransferInstruction::Dial {
                target: "+15559870000".to_string(),
                timeout: Duration::from_secs(20),
                caller_id: Some("+15551230000".to_string()),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_representative_fallback() {
        let (store, manager) = setup(Some("+15550000000"));
        let session = session("CA1", None);
        register(&store, &session);
        let intent = manager.request_transfer(&session).unwrap();
        assert_eq!(intent.target.as_deref(), Some("+15550000000"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_representative_goes_straight_to_hold() {
        let (store, manager) = setup(None);
        let session = session("CA1", Some("not-a-number"));
        register(&store, &session);
        manager.request_transfer(&session).unwrap();
        assert_eq!(
            manager.resume("CA1"),
            TransferInstruction::Hold { position: 1 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_for_unknown_call_fails() {
        let (_store, manager) = setup(None);
        assert_eq!(
            manager.request_transfer(&session("gone", None)),
            Err(TransferError::UnknownCall("gone".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_answer_enqueues_caller() {
        let (store, manager) = setup(None);
        for call_id in ["CA1", "CA2"] {
            let session = session(call_id, Some("+15559870000"));
            register(&store, &session);
            manager.request_transfer(&session).unwrap();
        }

        assert_eq!(
            manager.on_dial_result("CA1", DialStatus::NoAnswer),
            TransferInstruction::Hold { position: 1 }
        );
        assert_eq!(
            manager.on_dial_result("CA2", DialStatus::Busy),
            TransferInstruction::Hold { position: 2 }
        );
        assert_eq!(manager.hold_position("CA2"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_answered_dial_finishes_call() {
        let (store, manager) = setup(None);
        let session = session("CA1", Some("+15559870000"));
        register(&store, &session);
        manager.request_transfer(&session).unwrap();

        assert_eq!(
            manager.on_dial_result("CA1", DialStatus::Completed),
            TransferInstruction::NoIntent
        );
        assert!(store.get("CA1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_intent_is_not_executed() {
        let (store, manager) = setup(None);
        let session = session("CA1", Some("+15559870000"));
        register(&store, &session);
        manager.request_transfer(&session).unwrap();

        tokio::time::advance(Duration::from_secs(121)).await;
        assert_eq!(manager.resume("CA1"), TransferInstruction::NoIntent);
        assert_eq!(
            manager.on_dial_result("CA1", DialStatus::NoAnswer),
            TransferInstruction::NoIntent
        );
        assert_eq!(manager.hold_position("CA1"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dequeue_points_intent_at_representative() {
        let (store, manager) = setup(None);
        for call_id in ["CA1", "CA2"] {
            let session = session(call_id, None);
            register(&store, &session);
            manager.request_transfer(&session).unwrap();
            manager.resume(call_id);
        }
        // CA1's session expires while waiting.
        store.delete("CA1");

        assert_eq!(
            manager.dequeue_next(Some("+15554440000")),
            Ok(Some("CA2".to_string()))
        );
        assert_eq!(
            manager.resume("CA2"),
            TransferInstruction::Dial {
                target: "+15554440000".to_string(),
                timeout: Duration::from_secs(20),
                caller_id: Some("+15551230000".to_string()),
            }
        );
        assert_eq!(manager.dequeue_next(Some("+15554440000")), Ok(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dequeue_requires_a_representative() {
        let (_store, manager) = setup(None);
        assert_eq!(
            manager.dequeue_next(None),
            Err(TransferError::NoRepresentative)
        );
        assert!(matches!(
            manager.dequeue_next(Some("abc")),
            Err(TransferError::InvalidRepresentative(_))
        ));
    }
}
