//! Typed builder for the provider's call-control markup.
//!
//! ```
//! use callbridge::handlers::voice::markup::{Gather, VoiceResponse};
//!
//! let markup = VoiceResponse::new()
//!     .gather(
//!         Gather::new("https://calls.example.com/voice/gather")
//!             .timeout_secs(6)
//!             .num_digits(1)
//!             .say("Press 1 to accept."),
//!     )
//!     .redirect("https://calls.example.com/voice/gather?event=timeout")
//!     .render();
//! assert!(markup.contains("<Gather"));
//! ```

use std::fmt::Write;

use axum::http::header;
use axum::response::{IntoResponse, Response};

pub const CONTENT_TYPE: &str = "application/xml";

/// Escapes text and attribute values.
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Which caller inputs a [`Gather`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatherInput {
    Dtmf,
    Speech,
    #[default]
    DtmfSpeech,
}

impl GatherInput {
    fn as_str(&self) -> &'static str {
        match self {
            GatherInput::Dtmf => "dtmf",
            GatherInput::Speech => "speech",
            GatherInput::DtmfSpeech => "dtmf speech",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gather {
    action: String,
    input: GatherInput,
    timeout_secs: u64,
    num_digits: Option<usize>,
    finish_on_key: Option<char>,
    prompts: Vec<Verb>,
}

impl Gather {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            input: GatherInput::default(),
            timeout_secs: 5,
            num_digits: None,
            finish_on_key: None,
            prompts: Vec::new(),
        }
    }

    pub fn input(mut self, input: GatherInput) -> Self {
        self.input = input;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn num_digits(mut self, digits: usize) -> Self {
        self.num_digits = Some(digits);
        self
    }

    pub fn finish_on_key(mut self, key: char) -> Self {
        self.finish_on_key = Some(key);
        self
    }

    /// Speech played while waiting for input.
    pub fn say(mut self, text: impl Into<String>) -> Self {
        self.prompts.push(Verb::Say(text.into()));
        self
    }

    pub fn play(mut self, url: impl Into<String>) -> Self {
        self.prompts.push(Verb::Play(url.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dial {
    number: String,
    timeout_secs: u64,
    action: Option<String>,
    caller_id: Option<String>,
}

impl Dial {
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            timeout_secs: 20,
            action: None,
            caller_id: None,
        }
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Callback that receives the dial outcome.
    pub fn action(mut self, url: impl Into<String>) -> Self {
        self.action = Some(url.into());
        self
    }

    pub fn caller_id(mut self, number: impl Into<String>) -> Self {
        self.caller_id = Some(number.into());
        self
    }
}

/// Bidirectional media stream opened with `<Connect>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    url: String,
    parameters: Vec<(String, String)>,
}

impl Stream {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            parameters: Vec::new(),
        }
    }

    /// Custom parameter delivered in the stream's `start` event.
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Say(String),
    Play(String),
    Pause { length_secs: u64 },
    Gather(Gather),
    Dial(Dial),
    Redirect(String),
    Connect(Stream),
    Hangup,
}

impl Verb {
    fn write_to(&self, out: &mut String) {
        // Writing to a String cannot fail.
        let _ = match self {
            Verb::Say(text) => write!(out, "<Say>{}</Say>", escape_xml(text)),
            Verb::Play(url) => write!(out, "<Play>{}</Play>", escape_xml(url)),
            Verb::Pause { length_secs } => write!(out, "<Pause length=\"{length_secs}\"/>"),
            Verb::Gather(gather) => {
                let _ = write!(
                    out,
                    "<Gather input=\"{}\" action=\"{}\" method=\"POST\" timeout=\"{}\"",
                    gather.input.as_str(),
                    escape_xml(&gather.action),
                    gather.timeout_secs
                );
                if let Some(digits) = gather.num_digits {
                    let _ = write!(out, " numDigits=\"{digits}\"");
                }
                if let Some(key) = gather.finish_on_key {
                    let _ = write!(out, " finishOnKey=\"{}\"", escape_xml(&key.to_string()));
                }
                if gather.prompts.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    for prompt in &gather.prompts {
                        prompt.write_to(out);
                    }
                    out.push_str("</Gather>");
                }
                Ok(())
            }
            Verb::Dial(dial) => {
                let _ = write!(out, "<Dial timeout=\"{}\"", dial.timeout_secs);
                if let Some(action) = &dial.action {
                    let _ = write!(out, " action=\"{}\" method=\"POST\"", escape_xml(action));
                }
                if let Some(caller_id) = &dial.caller_id {
                    let _ = write!(out, " callerId=\"{}\"", escape_xml(caller_id));
                }
                write!(out, "><Number>{}</Number></Dial>", escape_xml(&dial.number))
            }
            Verb::Redirect(url) => write!(
                out,
                "<Redirect method=\"POST\">{}</Redirect>",
                escape_xml(url)
            ),
            Verb::Connect(stream) => {
                let _ = write!(out, "<Connect><Stream url=\"{}\"", escape_xml(&stream.url));
                if stream.parameters.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    for (name, value) in &stream.parameters {
                        let _ = write!(
                            out,
                            "<Parameter name=\"{}\" value=\"{}\"/>",
                            escape_xml(name),
                            escape_xml(value)
                        );
                    }
                    out.push_str("</Stream>");
                }
                write!(out, "</Connect>")
            }
            Verb::Hangup => write!(out, "<Hangup/>"),
        };
    }
}

/// A complete markup document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceResponse {
    verbs: Vec<Verb>,
}

impl VoiceResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verbs(&self) -> &[Verb] {
        &self.verbs
    }

    pub fn push(mut self, verb: Verb) -> Self {
        self.verbs.push(verb);
        self
    }

    pub fn say(self, text: impl Into<String>) -> Self {
        self.push(Verb::Say(text.into()))
    }

    pub fn play(self, url: impl Into<String>) -> Self {
        self.push(Verb::Play(url.into()))
    }

    pub fn pause(self, length_secs: u64) -> Self {
        self.push(Verb::Pause { length_secs })
    }

    pub fn gather(self, gather: Gather) -> Self {
        self.push(Verb::Gather(gather))
    }

    pub fn dial(self, dial: Dial) -> Self {
        self.push(Verb::Dial(dial))
    }

    pub fn redirect(self, url: impl Into<String>) -> Self {
        self.push(Verb::Redirect(url.into()))
    }

    pub fn connect(self, stream: Stream) -> Self {
        self.push(Verb::Connect(stream))
    }

    pub fn hangup(self) -> Self {
        self.push(Verb::Hangup)
    }

    pub fn render(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>");
        for verb in &self.verbs {
            verb.write_to(&mut out);
        }
        out.push_str("</Response>");
        out
    }
}

impl IntoResponse for VoiceResponse {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, CONTENT_TYPE)], self.render()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROLOG: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>";

    #[test]
    fn test_escape_xml() {
        assert_eq!(
            escape_xml(r#"Tom & Jerry's <"shift">"#),
            "Tom &amp; Jerry&apos;s &lt;&quot;shift&quot;&gt;"
        );
    }

    #[test]
    fn test_empty_response() {
        assert_eq!(
            VoiceResponse::new().render(),
            format!("{PROLOG}<Response></Response>")
        );
    }

    #[test]
    fn test_gather_with_nested_prompts() {
        let markup = VoiceResponse::new()
            .gather(
                Gather::new("https://x.test/voice/gather?a=1&b=2")
                    .input(GatherInput::DtmfSpeech)
                    .timeout_secs(8)
                    .num_digits(4)
                    .finish_on_key('#')
                    .say("Enter your PIN & press pound."),
            )
            .render();
        assert_eq!(
            markup,
            format!(
                "{PROLOG}<Response><Gather input=\"dtmf speech\" \
                 action=\"https://x.test/voice/gather?a=1&amp;b=2\" method=\"POST\" \
                 timeout=\"8\" numDigits=\"4\" finishOnKey=\"#\">\
                 <Say>Enter your PIN &amp; press pound.</Say></Gather></Response>"
            )
        );
    }

    #[test]
    fn test_dial_and_redirect() {
        let markup = VoiceResponse::new()
            .say("Connecting you now.")
            .dial(
                Dial::new("+15559870000")
                    .timeout_secs(20)
                    .action("https://x.test/voice/transfer/status")
                    .caller_id("+15551230000"),
            )
            .render();
        assert!(markup.contains(
            "<Dial timeout=\"20\" action=\"https://x.test/voice/transfer/status\" \
             method=\"POST\" callerId=\"+15551230000\"><Number>+15559870000</Number></Dial>"
        ));
        assert!(markup.starts_with(&format!("{PROLOG}<Response><Say>Connecting")));
    }

    #[test]
    fn test_connect_stream_with_parameters() {
        let markup = VoiceResponse::new()
            .connect(
                Stream::new("wss://x.test/media")
                    .parameter("caller", "+15551230000")
                    .parameter("mode", "hold"),
            )
            .redirect("https://x.test/voice/hold")
            .render();
        assert!(markup.contains(
            "<Connect><Stream url=\"wss://x.test/media\">\
             <Parameter name=\"caller\" value=\"+15551230000\"/>\
             <Parameter name=\"mode\" value=\"hold\"/></Stream></Connect>"
        ));
        assert!(markup.ends_with(
            "<Redirect method=\"POST\">https://x.test/voice/hold</Redirect></Response>"
        ));
    }

    #[test]
    fn test_pause_play_hangup() {
        let markup = VoiceResponse::new()
            .play("https://x.test/tone.wav")
            .pause(30)
            .hangup()
            .render();
        assert!(markup.contains("<Play>https://x.test/tone.wav</Play><Pause length=\"30\"/><Hangup/>"));
    }

    #[tokio::test]
    async fn test_into_response_sets_content_type() {
        let response = VoiceResponse::new().hangup().into_response();
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            CONTENT_TYPE
        );
    }
}
