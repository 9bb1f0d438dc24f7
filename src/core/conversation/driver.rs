//! Runs conversation transitions against the shared call state.
//!
//! [`CallDriver::handle`] is the single write path for a call's session:
//! read `(session, version)`, compute the transition, publish it with
//! compare-and-set, then execute the emitted effects in order. Data effects
//! go to the [`WorkforceDirectory`] and their results are fed back as the
//! next event; caller-facing effects become [`Directive`]s for whichever
//! front end owns the call (the media bridge or the markup callbacks).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::call_state::{CallSession, CallStateStore, Phase, StoreError};
use crate::core::directory::WorkforceDirectory;
use crate::core::transfer::TransferManager;

use super::events::{CallEvent, DataRequest, Effect};
use super::fsm::{ConversationFsm, Transition};
use super::prompts::Prompt;
use super::router::DigitMode;

/// Re-reads allowed when a compare-and-set loses a race.
const MAX_CAS_RETRIES: usize = 3;

/// Caller-facing instruction produced by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Speak(Prompt),
    Listen { timeout: Duration, mode: DigitMode },
    /// Hand the call to the transfer flow.
    Transfer { target: Option<String> },
    Hangup,
}

/// Receives directives as soon as they are produced.
pub trait DirectiveSink: Send + Sync {
    fn emit(&self, directive: Directive);
}

impl DirectiveSink for mpsc::UnboundedSender<Directive> {
    fn emit(&self, directive: Directive) {
        if self.send(directive).is_err() {
            debug!("Directive receiver dropped");
        }
    }
}

/// Buffers directives for request/response front ends.
#[derive(Debug, Default)]
pub struct CollectingSink {
    directives: Mutex<Vec<Directive>>,
}

impl CollectingSink {
    pub fn take(&self) -> Vec<Directive> {
        std::mem::take(&mut *self.directives.lock())
    }
}

impl DirectiveSink for CollectingSink {
    fn emit(&self, directive: Directive) {
        self.directives.lock().push(directive);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    #[error("Unknown or expired call: {0}")]
    UnknownCall(String),

    #[error("Call state for {0} kept changing concurrently")]
    Contention(String),

    #[error("Call {0} was cancelled")]
    Cancelled(String),
}

pub struct CallDriver {
    store: Arc<CallStateStore>,
    fsm: ConversationFsm,
    directory: Arc<dyn WorkforceDirectory>,
    transfers: Arc<TransferManager>,
}

impl CallDriver {
    pub fn new(
        store: Arc<CallStateStore>,
        fsm: ConversationFsm,
        directory: Arc<dyn WorkforceDirectory>,
        transfers: Arc<TransferManager>,
    ) -> Self {
        Self {
            store,
            fsm,
            directory,
            transfers,
        }
    }

    pub fn fsm(&self) -> &ConversationFsm {
        &self.fsm
    }

    pub fn store(&self) -> &Arc<CallStateStore> {
        &self.store
    }

    pub fn transfers(&self) -> &Arc<TransferManager> {
        &self.transfers
    }

    /// Registers a new call and runs the opening transition.
    ///
    /// A call that already has a live session is re-attached to `stream_id`
    /// without restarting the flow; its current phase is returned.
    pub async fn start(
        &self,
        call_id: &str,
        stream_id: Option<&str>,
        caller_phone: Option<String>,
        sink: &dyn DirectiveSink,
        cancel: &CancellationToken,
    ) -> Result<Phase, DriverError> {
        let mut session = CallSession::new(call_id, caller_phone.clone());
        session.stream_id = stream_id.map(str::to_string);

        match self.store.compare_and_set(call_id, 0, session, None) {
            Ok(_) => {
                info!(call_id, stream_id, "Call session registered");
                let outcome = self
                    .handle(call_id, CallEvent::Connected { caller_phone }, sink, cancel)
                    .await?;
                Ok(outcome.phase)
            }
            Err(StoreError::VersionConflict { .. }) => self.attach_stream(call_id, stream_id),
            Err(StoreError::NotFound(_)) => Err(DriverError::UnknownCall(call_id.to_string())),
        }
    }

    fn attach_stream(&self, call_id: &str, stream_id: Option<&str>) -> Result<Phase, DriverError> {
        for _ in 0..MAX_CAS_RETRIES {
            let current = self
                .store
                .get(call_id)
                .ok_or_else(|| DriverError::UnknownCall(call_id.to_string()))?;
            let mut session = current.session;
            session.stream_id = stream_id.map(str::to_string);
            let phase = session.phase;
            match self
                .store
                .compare_and_set(call_id, current.version, session, None)
            {
                Ok(_) => {
                    info!(call_id, stream_id, phase = %phase, "Stream attached to existing call");
                    return Ok(phase);
                }
                Err(StoreError::VersionConflict { .. }) => continue,
                Err(StoreError::NotFound(_)) => {
                    return Err(DriverError::UnknownCall(call_id.to_string()));
                }
            }
        }
        Err(DriverError::Contention(call_id.to_string()))
    }

    /// Applies `event` and every follow-up event its effects produce.
    pub async fn handle(
        &self,
        call_id: &str,
        event: CallEvent,
        sink: &dyn DirectiveSink,
        cancel: &CancellationToken,
    ) -> Result<DriveOutcome, DriverError> {
        let mut pending = VecDeque::from([event]);
        let mut phase = None;

        while let Some(event) = pending.pop_front() {
            let transition = self.apply(call_id, &event)?;
            if !transition.path.is_empty() {
                info!(
                    call_id,
                    event = event.name(),
                    path = ?transition.path,
                    "Conversation advanced"
                );
            }

            for effect in &transition.effects {
                match effect {
                    Effect::Speak(prompt) => sink.emit(Directive::Speak(prompt.clone())),
                    Effect::Listen { timeout, mode } => sink.emit(Directive::Listen {
                        timeout: *timeout,
                        mode: *mode,
                    }),
                    Effect::Hangup => sink.emit(Directive::Hangup),
                    Effect::Query(request) => {
                        let result = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                return Err(DriverError::Cancelled(call_id.to_string()));
                            }
                            result = self.execute(call_id, request) => result,
                        };
                        pending.push_back(result);
                    }
                    Effect::BeginTransfer(_) => self.begin_transfer(&transition, sink),
                }
            }

            if transition.session.phase.is_terminal() {
                self.transfers.finish(call_id);
                debug!(call_id, phase = %transition.session.phase, "Call session closed");
            }
            phase = Some(transition.session.phase);
        }

        Ok(DriveOutcome {
            phase: phase.unwrap_or(Phase::Failed),
        })
    }

    /// Transition plus compare-and-set, re-reading on version conflicts.
    fn apply(&self, call_id: &str, event: &CallEvent) -> Result<Transition, DriverError> {
        for attempt in 0..MAX_CAS_RETRIES {
            let current = self
                .store
                .get(call_id)
                .ok_or_else(|| DriverError::UnknownCall(call_id.to_string()))?;
            let transition = self.fsm.transition(&current.session, event);
            if transition.session == current.session {
                // Nothing to publish; keep the entry alive.
                self.store.touch(call_id, None).ok();
                return Ok(transition);
            }
            match self.store.compare_and_set(
                call_id,
                current.version,
                transition.session.clone(),
                None,
            ) {
                Ok(_) => return Ok(transition),
                Err(StoreError::VersionConflict { .. }) => {
                    debug!(call_id, attempt, "Re-reading call state after conflict");
                }
                Err(StoreError::NotFound(_)) => {
                    return Err(DriverError::UnknownCall(call_id.to_string()));
                }
            }
        }
        warn!(call_id, "Giving up on contended call state");
        Err(DriverError::Contention(call_id.to_string()))
    }

    fn begin_transfer(&self, transition: &Transition, sink: &dyn DirectiveSink) {
        match self.transfers.request_transfer(&transition.session) {
            Ok(intent) => sink.emit(Directive::Transfer {
                target: intent.target,
            }),
            Err(err) => {
                warn!(call_id = %transition.session.call_id, error = %err, "Transfer could not be started");
                sink.emit(Directive::Speak(Prompt::SystemError));
                sink.emit(Directive::Hangup);
            }
        }
    }

    async fn execute(&self, call_id: &str, request: &DataRequest) -> CallEvent {
        let result = match request {
            DataRequest::IdentityByPhone { phone } => self
                .directory
                .resolve_by_phone(phone)
                .await
                .map(CallEvent::IdentityResolved),
            DataRequest::IdentityByPin { pin } => self
                .directory
                .resolve_by_pin(pin)
                .await
                .map(CallEvent::IdentityResolved),
            DataRequest::OpenJobs { employee_id } => self
                .directory
                .list_open_jobs(employee_id)
                .await
                .map(CallEvent::JobsListed),
            DataRequest::RecordOutcome {
                employee_id,
                job_id,
                outcome,
            } => self
                .directory
                .record_outcome(employee_id, job_id, *outcome)
                .await
                .map(|_| CallEvent::OutcomeRecorded),
        };
        result.unwrap_or_else(|err| {
            warn!(call_id, ?request, error = %err, "Business-data request failed");
            CallEvent::ServiceFailed(err.to_string())
        })
    }
}

/// Where the call ended up after [`CallDriver::handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveOutcome {
    pub phase: Phase,
}
