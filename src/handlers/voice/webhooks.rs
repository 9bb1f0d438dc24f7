//! Call-control callbacks.
//!
//! Each request carries the call id and, depending on the route, keypad or
//! speech input, a dial outcome or a call status. Conversation state lives in
//! the call-state store, so callbacks minutes apart resume where the call
//! left off. Every handler answers with markup; failures become an apology
//! followed by a hangup.

use std::sync::Arc;
use std::time::Duration;

use axum::{Form, extract::State};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::core::conversation::{
    CallEvent, CollectingSink, DigitMode, Directive, DriverError, Prompt,
};
use crate::core::call_state::Phase;
use crate::core::speech::DEFAULT_CONFIDENCE;
use crate::core::transfer::{DialStatus, TransferInstruction};
use crate::handlers::media::{CALLER_PARAMETER, MODE_PARAMETER};
use crate::state::AppState;

use super::markup::{Dial, Gather, GatherInput, Stream, VoiceResponse};
use super::{GATHER_PATH, HOLD_PATH, TRANSFER_PATH, TRANSFER_STATUS_PATH};

/// Form fields posted by the provider. Unused fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct CallbackForm {
    pub call_sid: String,
    pub from: Option<String>,
    pub digits: Option<String>,
    pub speech_result: Option<String>,
    pub confidence: Option<String>,
    pub call_status: Option<String>,
    pub dial_call_status: Option<String>,
}

impl CallbackForm {
    fn caller(&self) -> Option<String> {
        self.from
            .as_deref()
            .map(str::trim)
            .filter(|from| !from.is_empty())
            .map(str::to_string)
    }

    /// Gather result as a conversation event; no input is a timeout.
    pub fn input_event(&self) -> CallEvent {
        if let Some(digits) = self.digits.as_deref().map(str::trim)
            && !digits.is_empty()
        {
            return CallEvent::Digits(digits.to_string());
        }
        if let Some(transcript) = self.speech_result.as_deref().map(str::trim)
            && !transcript.is_empty()
        {
            let confidence = self
                .confidence
                .as_deref()
                .and_then(|raw| raw.trim().parse::<f32>().ok())
                .unwrap_or(DEFAULT_CONFIDENCE);
            return CallEvent::Speech {
                transcript: transcript.to_string(),
                confidence,
            };
        }
        CallEvent::Timeout
    }
}

/// Apology and hangup.
pub fn system_error() -> VoiceResponse {
    VoiceResponse::new()
        .say(Prompt::SystemError.text())
        .hangup()
}

fn gather_timeout_secs(timeout: Duration) -> u64 {
    timeout.as_secs_f64().ceil().max(1.0) as u64
}

/// Markup for a batch of directives.
///
/// Speech is buffered until a `Listen`, which becomes a `Gather` speaking
/// the buffered prompts, followed by a redirect that reports the timeout.
/// Returns whether the markup already ends the document.
pub fn render_directives(config: &ServerConfig, directives: Vec<Directive>) -> (VoiceResponse, bool) {
    let mut response = VoiceResponse::new();
    let mut speech: Vec<String> = Vec::new();
    let mut remaining = directives.into_iter();

    while let Some(directive) = remaining.next() {
        match directive {
            Directive::Speak(prompt) => speech.push(prompt.text()),
            Directive::Listen { timeout, mode } => {
                let mut gather = Gather::new(config.callback_url(GATHER_PATH))
                    .input(GatherInput::DtmfSpeech)
                    .timeout_secs(gather_timeout_secs(timeout));
                gather = match mode {
                    DigitMode::SingleKey => gather.num_digits(1),
                    DigitMode::Collect {
                        max_digits,
                        finish_on,
                    } => gather.num_digits(max_digits).finish_on_key(finish_on),
                };
                for text in speech.drain(..) {
                    gather = gather.say(text);
                }
                response = response
                    .gather(gather)
                    .redirect(config.callback_url(GATHER_PATH));
                let skipped = remaining.count();
                if skipped > 0 {
                    debug!(skipped, "Directives after listen ignored");
                }
                return (response, true);
            }
            Directive::Transfer { .. } => {
                for text in speech.drain(..) {
                    response = response.say(text);
                }
                return (response.redirect(config.callback_url(TRANSFER_PATH)), true);
            }
            Directive::Hangup => {
                for text in speech.drain(..) {
                    response = response.say(text);
                }
                return (response.hangup(), true);
            }
        }
    }

    for text in speech {
        response = response.say(text);
    }
    (response, false)
}

/// Finishes markup that produced no closing verb, based on where the call is.
fn complete(state: &AppState, call_id: &str, response: VoiceResponse) -> VoiceResponse {
    match state.store.get(call_id).map(|current| current.session.phase) {
        Some(Phase::TransferRequested) => {
            response.redirect(state.config.callback_url(TRANSFER_PATH))
        }
        Some(phase) if !phase.is_terminal() => {
            // Re-enter the gather loop; no input counts as a timeout.
            response.redirect(state.config.callback_url(GATHER_PATH))
        }
        _ => response.say(Prompt::Goodbye.text()).hangup(),
    }
}

fn respond(state: &AppState, call_id: &str, directives: Vec<Directive>) -> VoiceResponse {
    let (response, closed) = render_directives(&state.config, directives);
    if closed {
        response
    } else {
        complete(state, call_id, response)
    }
}

/// Starts the automated flow and renders its opening directives.
async fn start_flow(state: &AppState, call_id: &str, caller: Option<String>) -> VoiceResponse {
    let sink = CollectingSink::default();
    let cancel = state.cancel.child_token();
    match state.driver.start(call_id, None, caller, &sink, &cancel).await {
        Ok(phase) => {
            debug!(call_id, phase = %phase, "Markup flow started");
            respond(state, call_id, sink.take())
        }
        Err(err) => {
            warn!(call_id, error = %err, "Could not start call flow");
            system_error()
        }
    }
}

/// Hold loop for a queued caller, appended to `response`.
fn hold_markup(
    state: &AppState,
    response: VoiceResponse,
    caller: Option<String>,
    position: usize,
) -> VoiceResponse {
    let hold_url = state.config.callback_url(HOLD_PATH);
    if state.config.voice_media_stream {
        let mut stream =
            Stream::new(state.config.media_stream_url()).parameter(MODE_PARAMETER, "hold");
        if let Some(caller) = caller {
            stream = stream.parameter(CALLER_PARAMETER, caller);
        }
        response.connect(stream).redirect(hold_url)
    } else {
        response
            .say(Prompt::HoldPosition { position }.text())
            .pause(state.config.transfer_hold_announcement_secs)
            .redirect(hold_url)
    }
}

fn instruction_markup(
    state: &AppState,
    call_id: &str,
    caller: Option<String>,
    instruction: TransferInstruction,
) -> VoiceResponse {
    match instruction {
        TransferInstruction::Dial {
            target,
            timeout,
            caller_id,
        } => {
            info!(call_id, target = %target, "Dialing representative");
            let mut dial = Dial::new(target)
                .timeout_secs(timeout.as_secs().max(1))
                .action(state.config.callback_url(TRANSFER_STATUS_PATH));
            if let Some(caller_id) = caller_id {
                dial = dial.caller_id(caller_id);
            }
            VoiceResponse::new().dial(dial)
        }
        TransferInstruction::Hold { position } => {
            info!(call_id, position, "Caller placed on hold");
            let unavailable = VoiceResponse::new().say(Prompt::RepresentativeUnavailable.text());
            hold_markup(state, unavailable, caller, position)
        }
        TransferInstruction::NoIntent => {
            if state.store.get(call_id).is_some() {
                warn!(call_id, "Transfer callback without a live intent");
                state.transfers.finish(call_id);
                system_error()
            } else {
                debug!(call_id, "Transfer callback for a finished call");
                VoiceResponse::new().hangup()
            }
        }
    }
}

fn session_caller(state: &AppState, call_id: &str, form: &CallbackForm) -> Option<String> {
    state
        .store
        .get(call_id)
        .and_then(|current| current.session.caller_phone)
        .or_else(|| form.caller())
}

/// `POST /voice/incoming`
pub async fn incoming_call(
    State(state): State<Arc<AppState>>,
    Form(form): Form<CallbackForm>,
) -> VoiceResponse {
    if form.call_sid.is_empty() {
        warn!("Incoming call without a call id");
        return system_error();
    }
    let call_id = form.call_sid.as_str();
    info!(call_id, from = form.from.as_deref().unwrap_or("-"), "Incoming call");

    if state.config.voice_media_stream {
        let mut stream = Stream::new(state.config.media_stream_url());
        if let Some(caller) = form.caller() {
            stream = stream.parameter(CALLER_PARAMETER, caller);
        }
        // Reached once the stream closes: transfer if one was requested.
        return VoiceResponse::new()
            .connect(stream)
            .redirect(state.config.callback_url(TRANSFER_PATH));
    }

    start_flow(&state, call_id, form.caller()).await
}

/// `POST /voice/gather`
pub async fn gather_input(
    State(state): State<Arc<AppState>>,
    Form(form): Form<CallbackForm>,
) -> VoiceResponse {
    if form.call_sid.is_empty() {
        warn!("Gather callback without a call id");
        return system_error();
    }
    let call_id = form.call_sid.as_str();
    let event = form.input_event();
    debug!(call_id, event = event.name(), "Gather callback");

    let sink = CollectingSink::default();
    let cancel = state.cancel.child_token();
    match state.driver.handle(call_id, event, &sink, &cancel).await {
        Ok(_) => respond(&state, call_id, sink.take()),
        Err(DriverError::UnknownCall(_)) => {
            info!(call_id, "Unknown or expired call on gather; restarting flow");
            start_flow(&state, call_id, form.caller()).await
        }
        Err(err) => {
            warn!(call_id, error = %err, "Gather callback failed");
            system_error()
        }
    }
}

/// `POST /voice/transfer`
pub async fn transfer_call(
    State(state): State<Arc<AppState>>,
    Form(form): Form<CallbackForm>,
) -> VoiceResponse {
    if form.call_sid.is_empty() {
        return system_error();
    }
    let call_id = form.call_sid.as_str();
    let caller = session_caller(&state, call_id, &form);
    let instruction = state.transfers.resume(call_id);
    instruction_markup(&state, call_id, caller, instruction)
}

/// `POST /voice/transfer/status`
pub async fn transfer_status(
    State(state): State<Arc<AppState>>,
    Form(form): Form<CallbackForm>,
) -> VoiceResponse {
    if form.call_sid.is_empty() {
        return system_error();
    }
    let call_id = form.call_sid.as_str();
    let status = DialStatus::parse(form.dial_call_status.as_deref().unwrap_or_default());
    let caller = session_caller(&state, call_id, &form);

    match state.transfers.on_dial_result(call_id, status) {
        TransferInstruction::NoIntent if status.was_answered() => VoiceResponse::new().hangup(),
        TransferInstruction::NoIntent => {
            warn!(call_id, ?status, "Dial failed with no transfer to fall back on");
            state.transfers.finish(call_id);
            system_error()
        }
        instruction => instruction_markup(&state, call_id, caller, instruction),
    }
}

/// `POST /voice/hold`
pub async fn hold_loop(
    State(state): State<Arc<AppState>>,
    Form(form): Form<CallbackForm>,
) -> VoiceResponse {
    if form.call_sid.is_empty() {
        return system_error();
    }
    let call_id = form.call_sid.as_str();

    if let Some(position) = state.transfers.hold_position(call_id) {
        if let Err(err) = state.store.touch(call_id, None) {
            warn!(call_id, error = %err, "Held call has no session");
        }
        let caller = session_caller(&state, call_id, &form);
        return hold_markup(&state, VoiceResponse::new(), caller, position);
    }

    let dequeued = state
        .store
        .get_intent(call_id)
        .is_some_and(|intent| intent.target.is_some());
    if dequeued {
        info!(call_id, "Held caller picked up; transferring");
        return VoiceResponse::new().redirect(state.config.callback_url(TRANSFER_PATH));
    }

    info!(call_id, "Hold ended without a representative");
    state.transfers.finish(call_id);
    VoiceResponse::new()
        .say(Prompt::Goodbye.text())
        .hangup()
}

fn is_final_status(status: &str) -> bool {
    matches!(
        status,
        "completed" | "busy" | "failed" | "no-answer" | "canceled"
    )
}

/// `POST /voice/status`: call lifecycle notifications.
pub async fn call_status(
    State(state): State<Arc<AppState>>,
    Form(form): Form<CallbackForm>,
) -> VoiceResponse {
    let status = form
        .call_status
        .as_deref()
        .map(|status| status.trim().to_ascii_lowercase())
        .unwrap_or_default();
    if form.call_sid.is_empty() || !is_final_status(&status) {
        return VoiceResponse::new();
    }
    let call_id = form.call_sid.as_str();
    info!(call_id, status = %status, "Call ended");

    if state.store.get(call_id).is_some() {
        let sink = CollectingSink::default();
        let cancel = state.cancel.child_token();
        if let Err(err) = state
            .driver
            .handle(call_id, CallEvent::Hangup, &sink, &cancel)
            .await
        {
            debug!(call_id, error = %err, "Hangup after call end not applied");
        }
    }
    state.transfers.finish(call_id);
    VoiceResponse::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::directory::Job;

    fn config() -> ServerConfig {
        ServerConfig {
            public_url: "https://calls.example.com".to_string(),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_input_event_mapping() {
        let digits = CallbackForm {
            call_sid: "CA1".to_string(),
            digits: Some(" 1234 ".to_string()),
            speech_result: Some("ignored".to_string()),
            ..Default::default()
        };
        assert_eq!(digits.input_event(), CallEvent::Digits("1234".to_string()));

        let speech = CallbackForm {
            speech_result: Some("accept".to_string()),
            confidence: Some("0.82".to_string()),
            ..Default::default()
        };
        assert_eq!(
            speech.input_event(),
            CallEvent::Speech {
                transcript: "accept".to_string(),
                confidence: 0.82,
            }
        );

        let unscored = CallbackForm {
            speech_result: Some("operator".to_string()),
            confidence: Some("n/a".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            unscored.input_event(),
            CallEvent::Speech { confidence, .. } if confidence == DEFAULT_CONFIDENCE
        ));

        let empty = CallbackForm {
            digits: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(empty.input_event(), CallEvent::Timeout);
    }

    #[test]
    fn test_listen_becomes_gather_with_buffered_prompts() {
        let directives = vec![
            Directive::Speak(Prompt::Welcome),
            Directive::Speak(Prompt::AskPin { length: 4 }),
            Directive::Listen {
                timeout: Duration::from_millis(7500),
                mode: DigitMode::Collect {
                    max_digits: 4,
                    finish_on: '#',
                },
            },
        ];
        let (response, closed) = render_directives(&config(), directives);
        assert!(closed);

        let markup = response.render();
        assert!(markup.contains(
            "<Gather input=\"dtmf speech\" action=\"https://calls.example.com/voice/gather\" \
             method=\"POST\" timeout=\"8\" numDigits=\"4\" finishOnKey=\"#\">"
        ));
        assert!(markup.contains("<Say>Welcome to the shift line.</Say>"));
        assert!(markup.ends_with(
            "</Gather><Redirect method=\"POST\">https://calls.example.com/voice/gather</Redirect></Response>"
        ));
    }

    #[test]
    fn test_single_key_menu_gathers_one_digit() {
        let job = Job {
            id: "j1".to_string(),
            title: "Forklift operator".to_string(),
            location: "Dock 4".to_string(),
            starts_at: "Monday 7 AM".to_string(),
            pay_rate: None,
        };
        let directives = vec![
            Directive::Speak(Prompt::JobMenu { jobs: vec![job] }),
            Directive::Listen {
                timeout: Duration::from_secs(6),
                mode: DigitMode::SingleKey,
            },
        ];
        let (response, _) = render_directives(&config(), directives);
        let markup = response.render();
        assert!(markup.contains("timeout=\"6\" numDigits=\"1\">"));
        assert!(markup.contains("Forklift operator"));
    }

    #[test]
    fn test_transfer_and_hangup_close_the_document() {
        let (response, closed) = render_directives(
            &config(),
            vec![
                Directive::Speak(Prompt::Transferring),
                Directive::Transfer {
                    target: Some("+15559870000".to_string()),
                },
            ],
        );
        assert!(closed);
        assert!(response.render().ends_with(
            "<Redirect method=\"POST\">https://calls.example.com/voice/transfer</Redirect></Response>"
        ));

        let (response, closed) = render_directives(
            &config(),
            vec![Directive::Speak(Prompt::Goodbye), Directive::Hangup],
        );
        assert!(closed);
        assert!(response.render().ends_with("<Hangup/></Response>"));
    }

    #[test]
    fn test_speech_without_closing_verb_is_kept() {
        let (response, closed) =
            render_directives(&config(), vec![Directive::Speak(Prompt::ServiceApology)]);
        assert!(!closed);
        assert_eq!(response.verbs().len(), 1);
    }

    #[test]
    fn test_final_statuses() {
        assert!(is_final_status("completed"));
        assert!(is_final_status("no-answer"));
        assert!(!is_final_status("ringing"));
        assert!(!is_final_status("in-progress"));
    }
}
