use std::time::Duration;

use crate::core::call_state::EscalationReason;
use crate::core::directory::{IdentityLookup, Job, JobOutcome};

use super::prompts::Prompt;
use super::router::DigitMode;

/// Input fed into one call's transition function.
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    /// Call reached the engine; `caller_phone` is the caller-id if known.
    Connected { caller_phone: Option<String> },
    /// Raw keypad input as delivered by the transport.
    Digits(String),
    Speech { transcript: String, confidence: f32 },
    /// No input within the phase window.
    Timeout,
    Hangup,
    TransportError(String),
    IdentityResolved(IdentityLookup),
    JobsListed(Vec<Job>),
    OutcomeRecorded,
    /// The outstanding data request failed.
    ServiceFailed(String),
    /// Synthesis or recognition failed after its own retries.
    SpeechFailed(String),
}

impl CallEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CallEvent::Connected { .. } => "connected",
            CallEvent::Digits(_) => "digits",
            CallEvent::Speech { .. } => "speech",
            CallEvent::Timeout => "timeout",
            CallEvent::Hangup => "hangup",
            CallEvent::TransportError(_) => "transport_error",
            CallEvent::IdentityResolved(_) => "identity_resolved",
            CallEvent::JobsListed(_) => "jobs_listed",
            CallEvent::OutcomeRecorded => "outcome_recorded",
            CallEvent::ServiceFailed(_) => "service_failed",
            CallEvent::SpeechFailed(_) => "speech_failed",
        }
    }
}

/// Query or update against the business-data store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataRequest {
    IdentityByPhone {
        phone: String,
    },
    IdentityByPin {
        pin: String,
    },
    OpenJobs {
        employee_id: String,
    },
    RecordOutcome {
        employee_id: String,
        job_id: String,
        outcome: JobOutcome,
    },
}

/// Declarative side effect emitted by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Speak(Prompt),
    /// Wait for caller input; a [`CallEvent::Timeout`] follows if none arrives.
    Listen { timeout: Duration, mode: DigitMode },
    Query(DataRequest),
    BeginTransfer(EscalationReason),
    Hangup,
}
