//! Conversation decision engine.
//!
//! ```text
//! Connecting ─► AwaitingIdentification ─► Authenticated ─► ProviderGreeting ─► JobMenu
//!      │                                                                       │  ▲
//!      └──────────── caller-id match ──────────►                               ▼  │
//!                                                                          JobDetail
//!                                                                          │      │
//!                                                               ConfirmAccept  ConfirmDecline
//!                                                                          │      │
//!                                                                          ▼      ▼
//!                                                                          Completed*
//! any phase ── escape / retries exhausted / service down ──► TransferRequested
//! any phase ── transport error ──► Failed*
//! ```
//!
//! [`ConversationFsm::transition`] is pure: it never performs I/O, it returns
//! the next session plus declarative [`Effect`]s for the caller to execute.
//! Results of data effects come back as the next [`CallEvent`].

use tracing::debug;

use crate::core::call_state::{CallSession, EscalationReason, Phase};
use crate::core::directory::{IdentityLookup, Job, JobOutcome};

use super::events::{CallEvent, DataRequest, Effect};
use super::prompts::{MAX_MENU_JOBS, Prompt};
use super::router::{DtmfRouter, FlowConfig, MenuAction, Routed};

/// Upstream failures tolerated per request before escalating.
pub const MAX_SERVICE_RETRIES: u8 = 1;

/// Output of one transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub session: CallSession,
    pub effects: Vec<Effect>,
    /// Phases entered during this transition, in order.
    pub path: Vec<Phase>,
}

impl Transition {
    fn unchanged(session: &CallSession) -> Self {
        Self {
            session: session.clone(),
            effects: Vec::new(),
            path: Vec::new(),
        }
    }

    fn enter(&mut self, phase: Phase) {
        self.session.enter(phase);
        self.path.push(phase);
    }

    fn speak(&mut self, prompt: Prompt) {
        self.effects.push(Effect::Speak(prompt));
    }

    fn query(&mut self, request: DataRequest) {
        self.session.pending_request = Some(request.clone());
        self.effects.push(Effect::Query(request));
    }
}

#[derive(Debug, Clone)]
pub struct ConversationFsm {
    router: DtmfRouter,
}

impl ConversationFsm {
    pub fn new(config: FlowConfig) -> Self {
        Self {
            router: DtmfRouter::new(config),
        }
    }

    pub fn router(&self) -> &DtmfRouter {
        &self.router
    }

    fn config(&self) -> &FlowConfig {
        self.router.config()
    }

    /// Computes the next session and effects for `event`.
    pub fn transition(&self, session: &CallSession, event: &CallEvent) -> Transition {
        let mut next = Transition::unchanged(session);

        if session.phase.is_terminal() {
            debug!(call_id = %session.call_id, event = event.name(), "Ignoring event on finished call");
            return next;
        }

        match event {
            CallEvent::Hangup => next.enter(Phase::Completed),
            CallEvent::TransportError(reason) => {
                debug!(call_id = %session.call_id, reason = %reason, "Transport failed");
                next.enter(Phase::Failed);
            }
            _ if session.phase == Phase::TransferRequested => {
                // Flow is handed to the transfer manager; nothing else applies.
            }
            CallEvent::Connected { caller_phone } => self.on_connected(&mut next, caller_phone),
            CallEvent::IdentityResolved(lookup) => self.on_identity(&mut next, lookup),
            CallEvent::JobsListed(jobs) => self.on_jobs(&mut next, jobs),
            CallEvent::OutcomeRecorded => self.on_outcome_recorded(&mut next),
            CallEvent::ServiceFailed(reason) => self.on_service_failed(&mut next, reason),
            CallEvent::SpeechFailed(reason) => self.on_speech_failed(&mut next, reason),
            CallEvent::Timeout => {
                if session.phase.accepts_input() {
                    self.failed_attempt(&mut next, Prompt::NoInput);
                }
            }
            CallEvent::Digits(_) | CallEvent::Speech { .. } => {
                match self.router.route(session.phase, event) {
                    Routed::Action(MenuAction::Escape) => {
                        self.escalate(&mut next, EscalationReason::CallerRequested)
                    }
                    // Input while nothing is being asked is not held against the caller.
                    _ if !session.phase.accepts_input() => {}
                    Routed::Action(action) => self.on_action(&mut next, action),
                    Routed::Invalid(reason) => {
                        debug!(call_id = %session.call_id, phase = %session.phase, reason = %reason, "Invalid input");
                        self.failed_attempt(&mut next, Prompt::InvalidInput);
                    }
                    Routed::NotInput => {}
                }
            }
        }
        next
    }

    fn on_connected(&self, next: &mut Transition, caller_phone: &Option<String>) {
        if next.session.phase != Phase::Connecting {
            return;
        }
        if caller_phone.is_some() {
            next.session.caller_phone = caller_phone.clone();
        }
        next.speak(Prompt::Welcome);
        match next.session.caller_phone.clone() {
            Some(phone) => next.query(DataRequest::IdentityByPhone { phone }),
            None => self.ask_for_pin(next),
        }
    }

    fn ask_for_pin(&self, next: &mut Transition) {
        next.enter(Phase::AwaitingIdentification);
        self.prompt_phase(next);
    }

    fn on_identity(&self, next: &mut Transition, lookup: &IdentityLookup) {
        if !matches!(
            next.session.phase,
            Phase::Connecting | Phase::AwaitingIdentification
        ) {
            return;
        }
        let by_pin = matches!(
            next.session.pending_request,
            Some(DataRequest::IdentityByPin { .. })
        );
        self.request_settled(next);

        match lookup {
            IdentityLookup::Found(identity) => {
                next.session.identity = Some(identity.clone());
                next.enter(Phase::Authenticated);
                next.enter(Phase::ProviderGreeting);
                next.speak(Prompt::Greeting {
                    first_name: identity.first_name.clone(),
                    provider: identity.provider.name.clone(),
                });
                next.query(DataRequest::OpenJobs {
                    employee_id: identity.employee_id.clone(),
                });
            }
            IdentityLookup::Ambiguous(_) | IdentityLookup::NotFound if by_pin => {
                self.failed_attempt(next, Prompt::PinNotRecognized);
            }
            IdentityLookup::Ambiguous(_) | IdentityLookup::NotFound => self.ask_for_pin(next),
        }
    }

    fn on_jobs(&self, next: &mut Transition, jobs: &[Job]) {
        if next.session.phase != Phase::ProviderGreeting {
            return;
        }
        self.request_settled(next);
        next.session.jobs = jobs.iter().take(MAX_MENU_JOBS).cloned().collect();
        next.session.selected_job = None;
        if next.session.jobs.is_empty() {
            next.speak(Prompt::NoJobs);
            self.finish(next);
        } else {
            next.enter(Phase::JobMenu);
            self.prompt_phase(next);
        }
    }

    fn on_outcome_recorded(&self, next: &mut Transition) {
        self.request_settled(next);
        match (next.session.phase, next.session.selected().cloned()) {
            (Phase::ConfirmAccept, Some(job)) => {
                next.speak(Prompt::Accepted { job });
                self.finish(next);
            }
            (Phase::ConfirmDecline, _) => {
                next.speak(Prompt::Declined);
                self.finish(next);
            }
            _ => {}
        }
    }

    fn on_service_failed(&self, next: &mut Transition, reason: &str) {
        let Some(request) = next.session.pending_request.clone() else {
            return;
        };
        if next.session.service_retries < MAX_SERVICE_RETRIES {
            next.session.service_retries += 1;
            debug!(call_id = %next.session.call_id, reason, "Retrying failed data request");
            next.speak(Prompt::ServiceApology);
            next.query(request);
        } else {
            self.escalate(next, EscalationReason::ServiceUnavailable);
        }
    }

    fn on_speech_failed(&self, next: &mut Transition, reason: &str) {
        if next.session.service_retries < MAX_SERVICE_RETRIES {
            next.session.service_retries += 1;
            debug!(call_id = %next.session.call_id, reason, "Speech service failed; re-prompting");
            next.speak(Prompt::ServiceApology);
            self.prompt_phase(next);
        } else {
            self.escalate(next, EscalationReason::ServiceUnavailable);
        }
    }

    fn on_action(&self, next: &mut Transition, action: MenuAction) {
        let phase = next.session.phase;
        if next.session.pending_request.is_none() {
            next.session.service_retries = 0;
        }
        match (phase, action) {
            (Phase::AwaitingIdentification, MenuAction::Pin(pin)) => {
                if pin.len() == self.config().pin_length {
                    next.query(DataRequest::IdentityByPin { pin });
                } else {
                    self.failed_attempt(next, Prompt::PinNotRecognized);
                }
            }
            (Phase::JobMenu, MenuAction::Select(index)) if index < next.session.jobs.len() => {
                next.session.selected_job = Some(index);
                next.enter(Phase::JobDetail);
                self.prompt_phase(next);
            }
            (Phase::JobMenu, MenuAction::End) => {
                next.speak(Prompt::Goodbye);
                self.finish(next);
            }
            (Phase::JobDetail, MenuAction::Accept) => {
                next.enter(Phase::ConfirmAccept);
                self.prompt_phase(next);
            }
            (Phase::JobDetail, MenuAction::Decline) => {
                next.enter(Phase::ConfirmDecline);
                self.prompt_phase(next);
            }
            (Phase::JobDetail, MenuAction::Back) => {
                next.session.selected_job = None;
                next.enter(Phase::JobMenu);
                self.prompt_phase(next);
            }
            (Phase::ConfirmAccept | Phase::ConfirmDecline, MenuAction::Confirm) => {
                let outcome = if phase == Phase::ConfirmAccept {
                    JobOutcome::Accepted
                } else {
                    JobOutcome::Declined
                };
                let request = match (&next.session.identity, next.session.selected()) {
                    (Some(identity), Some(job)) => Some(DataRequest::RecordOutcome {
                        employee_id: identity.employee_id.clone(),
                        job_id: job.id.clone(),
                        outcome,
                    }),
                    _ => None,
                };
                match request {
                    Some(request) => next.query(request),
                    None => self.escalate(next, EscalationReason::ServiceUnavailable),
                }
            }
            (Phase::ConfirmAccept | Phase::ConfirmDecline, MenuAction::Cancel) => {
                next.enter(Phase::JobDetail);
                self.prompt_phase(next);
            }
            (_, MenuAction::Repeat) => self.prompt_phase(next),
            (_, action) => {
                debug!(call_id = %next.session.call_id, phase = %phase, ?action, "Action not valid here");
                self.failed_attempt(next, Prompt::InvalidInput);
            }
        }
    }

    /// Counts a failed attempt; at the cap the call escalates instead of re-prompting.
    fn failed_attempt(&self, next: &mut Transition, reason: Prompt) {
        let attempts = next.session.attempts.saturating_add(1);
        if attempts >= self.config().max_attempts {
            next.session.attempts = attempts.min(self.config().max_attempts);
            self.escalate(next, EscalationReason::RetriesExhausted);
            return;
        }
        next.session.attempts = attempts;
        next.speak(reason);
        self.prompt_phase(next);
    }

    fn escalate(&self, next: &mut Transition, reason: EscalationReason) {
        if matches!(next.session.phase, Phase::TransferRequested) || next.session.phase.is_terminal()
        {
            return;
        }
        debug!(call_id = %next.session.call_id, from = %next.session.phase, ?reason, "Escalating to representative");
        next.session.pending_request = None;
        next.session.pending_transfer = true;
        next.session.escalation = Some(reason);
        next.enter(Phase::TransferRequested);
        next.speak(Prompt::Transferring);
        next.effects.push(Effect::BeginTransfer(reason));
    }

    fn finish(&self, next: &mut Transition) {
        next.session.pending_request = None;
        next.enter(Phase::Completed);
        next.effects.push(Effect::Hangup);
    }

    fn request_settled(&self, next: &mut Transition) {
        next.session.pending_request = None;
        next.session.service_retries = 0;
    }

    /// Speaks the current phase's prompt and listens for input.
    fn prompt_phase(&self, next: &mut Transition) {
        let session = &next.session;
        let prompt = match session.phase {
            Phase::AwaitingIdentification => Prompt::AskPin {
                length: self.config().pin_length,
            },
            Phase::JobMenu => Prompt::JobMenu {
                jobs: session.jobs.clone(),
            },
            Phase::JobDetail | Phase::ConfirmAccept | Phase::ConfirmDecline => {
                let Some(job) = session.selected().cloned() else {
                    return;
                };
                match session.phase {
                    Phase::JobDetail => Prompt::JobDetail { job },
                    Phase::ConfirmAccept => Prompt::ConfirmAccept { job },
                    _ => Prompt::ConfirmDecline { job },
                }
            }
            _ => return,
        };
        next.speak(prompt);
        if let Some(route) = self.router.route_for(next.session.phase) {
            next.effects.push(Effect::Listen {
                timeout: route.timeout,
                mode: route.mode,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::directory::{Identity, ProviderContext};
    use std::time::Duration;

    fn fsm() -> ConversationFsm {
        ConversationFsm::new(FlowConfig::default())
    }

    fn identity() -> Identity {
        Identity {
            employee_id: "e1".to_string(),
            first_name: "Dana".to_string(),
            phone: Some("+15551230000".to_string()),
            provider: ProviderContext {
                id: "p1".to_string(),
                name: "Northside Staffing".to_string(),
                representative_phone: Some("+15559870000".to_string()),
            },
        }
    }

    fn jobs(n: usize) -> Vec<Job> {
        (0..n)
            .map(|i| Job {
                id: format!("j{i}"),
                title: format!("Shift {i}"),
                location: "Dock 4".to_string(),
                starts_at: "Monday 7 AM".to_string(),
                pay_rate: None,
            })
            .collect()
    }

    fn in_phase(phase: Phase) -> CallSession {
        let mut session = CallSession::new("CA1", Some("+15551230000".to_string()));
        session.identity = Some(identity());
        session.jobs = jobs(2);
        session.phase = phase;
        if matches!(
            phase,
            Phase::JobDetail | Phase::ConfirmAccept | Phase::ConfirmDecline
        ) {
            session.selected_job = Some(0);
        }
        session
    }

    fn digits(keys: &str) -> CallEvent {
        CallEvent::Digits(keys.to_string())
    }

    fn has_transfer(t: &Transition) -> bool {
        t.effects
            .iter()
            .any(|e| matches!(e, Effect::BeginTransfer(_)))
    }

    #[test]
    fn test_connected_with_caller_id_looks_up_phone() {
        let session = CallSession::new("CA1", None);
        let t = fsm().transition(
            &session,
            &CallEvent::Connected {
                caller_phone: Some("+15551230000".to_string()),
            },
        );
        assert_eq!(t.session.phase, Phase::Connecting);
        assert_eq!(
            t.effects,
            vec![
                Effect::Speak(Prompt::Welcome),
                Effect::Query(DataRequest::IdentityByPhone {
                    phone: "+15551230000".to_string()
                })
            ]
        );
    }

    #[test]
    fn test_connected_without_caller_id_asks_for_pin() {
        let session = CallSession::new("CA1", None);
        let t = fsm().transition(&session, &CallEvent::Connected { caller_phone: None });
        assert_eq!(t.session.phase, Phase::AwaitingIdentification);
        assert!(t.effects.contains(&Effect::Speak(Prompt::AskPin { length: 4 })));
        assert!(matches!(t.effects.last(), Some(Effect::Listen { .. })));
    }

    #[test]
    fn test_unknown_phone_falls_back_to_pin() {
        let session = CallSession::new("CA1", Some("+15550000000".to_string()));
        let fsm = fsm();
        let t = fsm.transition(&session, &CallEvent::Connected { caller_phone: None });
        let t = fsm.transition(
            &t.session,
            &CallEvent::IdentityResolved(IdentityLookup::NotFound),
        );
        assert_eq!(t.session.phase, Phase::AwaitingIdentification);
        assert_eq!(t.session.attempts, 0);
    }

    #[test]
    fn test_valid_pin_authenticates_and_greets() {
        let fsm = fsm();
        let session = CallSession {
            phase: Phase::AwaitingIdentification,
            ..CallSession::new("CA1", None)
        };
        let t = fsm.transition(&session, &digits("4821#"));
        assert_eq!(
            t.effects,
            vec![Effect::Query(DataRequest::IdentityByPin {
                pin: "4821".to_string()
            })]
        );

        let t = fsm.transition(
            &t.session,
            &CallEvent::IdentityResolved(IdentityLookup::Found(identity())),
        );
        assert_eq!(t.path, vec![Phase::Authenticated, Phase::ProviderGreeting]);
        assert_eq!(t.session.phase, Phase::ProviderGreeting);
        assert_eq!(
            t.effects[0],
            Effect::Speak(Prompt::Greeting {
                first_name: "Dana".to_string(),
                provider: "Northside Staffing".to_string()
            })
        );
        assert_eq!(
            t.effects[1],
            Effect::Query(DataRequest::OpenJobs {
                employee_id: "e1".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_pin_counts_as_attempt() {
        let fsm = fsm();
        let session = CallSession {
            phase: Phase::AwaitingIdentification,
            ..CallSession::new("CA1", None)
        };
        let t = fsm.transition(&session, &digits("1111"));
        let t = fsm.transition(
            &t.session,
            &CallEvent::IdentityResolved(IdentityLookup::NotFound),
        );
        assert_eq!(t.session.attempts, 1);
        assert_eq!(t.effects[0], Effect::Speak(Prompt::PinNotRecognized));

        let t = fsm.transition(&t.session, &digits("2222"));
        let t = fsm.transition(
            &t.session,
            &CallEvent::IdentityResolved(IdentityLookup::Ambiguous(2)),
        );
        assert_eq!(t.session.phase, Phase::TransferRequested);
    }

    #[test]
    fn test_two_timeouts_in_identification_escalate() {
        let fsm = fsm();
        let session = CallSession {
            phase: Phase::AwaitingIdentification,
            ..CallSession::new("CA1", None)
        };
        let t = fsm.transition(&session, &CallEvent::Timeout);
        assert_eq!(t.session.phase, Phase::AwaitingIdentification);
        assert_eq!(t.session.attempts, 1);
        assert_eq!(t.effects[0], Effect::Speak(Prompt::NoInput));

        let t = fsm.transition(&t.session, &CallEvent::Timeout);
        assert_eq!(t.session.phase, Phase::TransferRequested);
        assert!(t.session.pending_transfer);
        assert_eq!(
            t.session.escalation,
            Some(EscalationReason::RetriesExhausted)
        );
        assert_eq!(
            t.effects,
            vec![
                Effect::Speak(Prompt::Transferring),
                Effect::BeginTransfer(EscalationReason::RetriesExhausted)
            ]
        );
    }

    #[test]
    fn test_attempts_never_exceed_cap() {
        for max_attempts in 1..=4u8 {
            let fsm = ConversationFsm::new(FlowConfig {
                max_attempts,
                ..Default::default()
            });
            for phase in [
                Phase::AwaitingIdentification,
                Phase::JobMenu,
                Phase::JobDetail,
                Phase::ConfirmAccept,
                Phase::ConfirmDecline,
            ] {
                let mut session = in_phase(phase);
                for event in [digits("7"), CallEvent::Timeout, digits("#")]
                    .iter()
                    .cycle()
                    .take(10)
                {
                    let t = fsm.transition(&session, event);
                    assert!(t.session.attempts <= max_attempts);
                    session = t.session;
                    if session.phase == Phase::TransferRequested {
                        break;
                    }
                }
                assert_eq!(session.phase, Phase::TransferRequested, "phase {phase}");
            }
        }
    }

    #[test]
    fn test_zero_in_job_menu_transfers_immediately() {
        let t = fsm().transition(&in_phase(Phase::JobMenu), &digits("0"));
        assert_eq!(t.session.phase, Phase::TransferRequested);
        assert_eq!(
            t.session.escalation,
            Some(EscalationReason::CallerRequested)
        );
        assert!(has_transfer(&t));
    }

    #[test]
    fn test_jobs_listed_opens_menu_or_ends() {
        let fsm = fsm();
        let mut session = in_phase(Phase::ProviderGreeting);
        session.jobs.clear();

        let t = fsm.transition(&session, &CallEvent::JobsListed(jobs(3)));
        assert_eq!(t.session.phase, Phase::JobMenu);
        assert_eq!(t.session.jobs.len(), 3);
        assert!(matches!(
            t.effects.last(),
            Some(Effect::Listen { timeout, .. }) if *timeout == Duration::from_secs(6)
        ));

        let t = fsm.transition(&session, &CallEvent::JobsListed(Vec::new()));
        assert_eq!(t.session.phase, Phase::Completed);
        assert_eq!(
            t.effects,
            vec![Effect::Speak(Prompt::NoJobs), Effect::Hangup]
        );
    }

    #[test]
    fn test_accept_flow_records_outcome() {
        let fsm = fsm();
        let t = fsm.transition(&in_phase(Phase::JobMenu), &digits("2"));
        assert_eq!(t.session.phase, Phase::JobDetail);
        assert_eq!(t.session.selected_job, Some(1));

        let t = fsm.transition(&t.session, &digits("1"));
        assert_eq!(t.session.phase, Phase::ConfirmAccept);

        let t = fsm.transition(&t.session, &digits("1"));
        assert_eq!(
            t.effects,
            vec![Effect::Query(DataRequest::RecordOutcome {
                employee_id: "e1".to_string(),
                job_id: "j1".to_string(),
                outcome: JobOutcome::Accepted
            })]
        );

        let t = fsm.transition(&t.session, &CallEvent::OutcomeRecorded);
        assert_eq!(t.session.phase, Phase::Completed);
        assert!(matches!(
            t.effects[0],
            Effect::Speak(Prompt::Accepted { .. })
        ));
        assert_eq!(t.effects[1], Effect::Hangup);
    }

    #[test]
    fn test_decline_cancel_returns_to_detail() {
        let fsm = fsm();
        let t = fsm.transition(&in_phase(Phase::JobDetail), &digits("2"));
        assert_eq!(t.session.phase, Phase::ConfirmDecline);
        let t = fsm.transition(&t.session, &digits("2"));
        assert_eq!(t.session.phase, Phase::JobDetail);
        let t = fsm.transition(&t.session, &digits("*"));
        assert_eq!(t.session.phase, Phase::JobMenu);
        assert_eq!(t.session.selected_job, None);
    }

    #[test]
    fn test_menu_selection_out_of_range_is_invalid() {
        let t = fsm().transition(&in_phase(Phase::JobMenu), &digits("5"));
        assert_eq!(t.session.phase, Phase::JobMenu);
        assert_eq!(t.session.attempts, 1);
        assert_eq!(t.effects[0], Effect::Speak(Prompt::InvalidInput));
    }

    #[test]
    fn test_repeat_does_not_cost_an_attempt() {
        let t = fsm().transition(&in_phase(Phase::JobMenu), &digits("9"));
        assert_eq!(t.session.attempts, 0);
        assert!(matches!(t.effects[0], Effect::Speak(Prompt::JobMenu { .. })));
    }

    #[test]
    fn test_service_failure_retries_once_then_escalates() {
        let fsm = fsm();
        let mut session = in_phase(Phase::ProviderGreeting);
        session.pending_request = Some(DataRequest::OpenJobs {
            employee_id: "e1".to_string(),
        });

        let t = fsm.transition(&session, &CallEvent::ServiceFailed("503".to_string()));
        assert_eq!(t.session.phase, Phase::ProviderGreeting);
        assert_eq!(
            t.effects,
            vec![
                Effect::Speak(Prompt::ServiceApology),
                Effect::Query(DataRequest::OpenJobs {
                    employee_id: "e1".to_string()
                })
            ]
        );

        let t = fsm.transition(&t.session, &CallEvent::ServiceFailed("503".to_string()));
        assert_eq!(t.session.phase, Phase::TransferRequested);
        assert_eq!(
            t.session.escalation,
            Some(EscalationReason::ServiceUnavailable)
        );
    }

    #[test]
    fn test_speech_failure_reprompts_once_then_escalates() {
        let fsm = fsm();
        let t = fsm.transition(
            &in_phase(Phase::JobMenu),
            &CallEvent::SpeechFailed("synthesis down".to_string()),
        );
        assert_eq!(t.effects[0], Effect::Speak(Prompt::ServiceApology));
        assert!(matches!(t.effects[1], Effect::Speak(Prompt::JobMenu { .. })));
        assert_eq!(t.session.phase, Phase::JobMenu);

        let t = fsm.transition(
            &t.session,
            &CallEvent::SpeechFailed("synthesis down".to_string()),
        );
        assert_eq!(t.session.phase, Phase::TransferRequested);
    }

    #[test]
    fn test_hangup_and_transport_error_are_terminal() {
        let fsm = fsm();
        let t = fsm.transition(&in_phase(Phase::JobMenu), &CallEvent::Hangup);
        assert_eq!(t.session.phase, Phase::Completed);
        assert!(t.effects.is_empty());

        let t = fsm.transition(
            &in_phase(Phase::JobDetail),
            &CallEvent::TransportError("reset".to_string()),
        );
        assert_eq!(t.session.phase, Phase::Failed);

        let after = fsm.transition(&t.session, &digits("0"));
        assert_eq!(after.session, t.session);
        assert!(after.effects.is_empty());
    }

    #[test]
    fn test_input_ignored_after_transfer_requested() {
        let t = fsm().transition(&in_phase(Phase::TransferRequested), &digits("1"));
        assert!(t.effects.is_empty());
        assert_eq!(t.session.phase, Phase::TransferRequested);
    }

    #[test]
    fn test_timeout_outside_input_phase_is_ignored() {
        let t = fsm().transition(&in_phase(Phase::ProviderGreeting), &CallEvent::Timeout);
        assert!(t.effects.is_empty());
        assert_eq!(t.session.attempts, 0);
    }
}
