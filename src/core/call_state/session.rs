use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::core::conversation::events::DataRequest;
use crate::core::directory::{Identity, Job};

/// Conversation phase of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Call is connected, caller-id lookup not yet answered.
    Connecting,
    /// Caller has to key or say their PIN.
    AwaitingIdentification,
    Authenticated,
    /// Greeting spoken, open jobs being fetched.
    ProviderGreeting,
    JobMenu,
    JobDetail,
    ConfirmAccept,
    ConfirmDecline,
    TransferRequested,
    Completed,
    Failed,
}

impl Phase {
    /// Completed and Failed end the flow; the store entry is deleted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }

    /// Phases that wait on caller input and carry a timeout.
    pub fn accepts_input(&self) -> bool {
        matches!(
            self,
            Phase::AwaitingIdentification
                | Phase::JobMenu
                | Phase::JobDetail
                | Phase::ConfirmAccept
                | Phase::ConfirmDecline
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Connecting => "connecting",
            Phase::AwaitingIdentification => "awaiting_identification",
            Phase::Authenticated => "authenticated",
            Phase::ProviderGreeting => "provider_greeting",
            Phase::JobMenu => "job_menu",
            Phase::JobDetail => "job_detail",
            Phase::ConfirmAccept => "confirm_accept",
            Phase::ConfirmDecline => "confirm_decline",
            Phase::TransferRequested => "transfer_requested",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a call was escalated to a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    CallerRequested,
    RetriesExhausted,
    ServiceUnavailable,
}

/// Conversation state of one call, persisted in the [`CallStateStore`].
///
/// Only `ConversationFSM` transitions produce new values of this type.
///
/// [`CallStateStore`]: super::CallStateStore
#[derive(Debug, Clone, PartialEq)]
pub struct CallSession {
    pub call_id: String,
    /// Media stream currently attached, if any.
    pub stream_id: Option<String>,
    pub phase: Phase,
    pub caller_phone: Option<String>,
    /// `None` until the caller is identified.
    pub identity: Option<Identity>,
    pub jobs: Vec<Job>,
    /// Index into `jobs`.
    pub selected_job: Option<usize>,
    /// Failed attempts in the current phase.
    pub attempts: u8,
    /// Re-issues of `pending_request` after an upstream failure.
    pub service_retries: u8,
    /// Outstanding data request, kept so it can be retried once.
    pub pending_request: Option<DataRequest>,
    pub pending_transfer: bool,
    pub escalation: Option<EscalationReason>,
}

impl CallSession {
    pub fn new(call_id: impl Into<String>, caller_phone: Option<String>) -> Self {
        Self {
            call_id: call_id.into(),
            stream_id: None,
            phase: Phase::Connecting,
            caller_phone,
            identity: None,
            jobs: Vec::new(),
            selected_job: None,
            attempts: 0,
            service_retries: 0,
            pending_request: None,
            pending_transfer: false,
            escalation: None,
        }
    }

    pub fn with_stream(mut self, stream_id: impl Into<String>) -> Self {
        self.stream_id = Some(stream_id.into());
        self
    }

    pub fn selected(&self) -> Option<&Job> {
        self.selected_job.and_then(|index| self.jobs.get(index))
    }

    /// Moves to `phase`, resetting the per-phase attempt counter when it changes.
    pub fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            self.attempts = 0;
        }
        self.phase = phase;
    }
}

/// Pending hand-off from the automated flow to a representative.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferIntent {
    /// Representative number to dial; `None` sends the caller straight to hold.
    pub target: Option<String>,
    pub caller_phone: Option<String>,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl TransferIntent {
    pub fn new(target: Option<String>, caller_phone: Option<String>, ttl: Duration) -> Self {
        Self {
            target,
            caller_phone,
            created_at: Instant::now(),
            ttl,
        }
    }

    pub fn expires_at(&self) -> Instant {
        self.created_at + self.ttl
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at()
    }
}
