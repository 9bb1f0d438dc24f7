//! Phase-scoped input dispatch.
//!
//! Each input phase owns a key table mapping a key (or key range) to a menu
//! action, a spoken-keyword table, a digit-collection mode and a timeout.
//! Key `0` on its own is the universal "talk to a human" escape and wins over
//! every phase table. Input no table maps is reported as invalid so the FSM
//! can count it against the retry cap.

use std::time::Duration;

use crate::core::call_state::Phase;

use super::events::CallEvent;

/// Key that requests a human from any phase.
pub const ESCAPE_KEY: char = '0';

/// Spoken phrases equivalent to the escape key.
const ESCAPE_WORDS: [&str; 5] = ["operator", "representative", "agent", "human", "person"];

/// Recognition results below this confidence are treated as unintelligible.
const MIN_SPEECH_CONFIDENCE: f32 = 0.3;

/// Timing and collection parameters for the conversation flow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowConfig {
    pub max_attempts: u8,
    pub identification_timeout: Duration,
    pub menu_timeout: Duration,
    pub confirm_timeout: Duration,
    pub pin_length: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            identification_timeout: Duration::from_secs(8),
            menu_timeout: Duration::from_secs(6),
            confirm_timeout: Duration::from_secs(6),
            pin_length: 4,
        }
    }
}

/// How keypad input is gathered in a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigitMode {
    /// The first key decides.
    SingleKey,
    /// Keys accumulate until `finish_on` or `max_digits` keys.
    Collect { max_digits: usize, finish_on: char },
}

/// Caller intent after routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
    Escape,
    Pin(String),
    /// Zero-based job index.
    Select(usize),
    Repeat,
    End,
    Accept,
    Decline,
    Back,
    Confirm,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    Action(MenuAction),
    /// Input arrived but maps to nothing in this phase.
    Invalid(String),
    /// The event is not caller input.
    NotInput,
}

/// Routing parameters for one input phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseRoute {
    pub mode: DigitMode,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy)]
enum KeyPattern {
    Key(char),
    Range(char, char),
}

impl KeyPattern {
    fn matches(&self, key: char) -> bool {
        match *self {
            KeyPattern::Key(expected) => key == expected,
            KeyPattern::Range(low, high) => (low..=high).contains(&key),
        }
    }
}

type ActionFn = fn(char) -> MenuAction;

struct KeyBinding {
    pattern: KeyPattern,
    action: ActionFn,
}

const fn bind(pattern: KeyPattern, action: ActionFn) -> KeyBinding {
    KeyBinding { pattern, action }
}

fn select(key: char) -> MenuAction {
    MenuAction::Select(key as usize - '1' as usize)
}
fn repeat(_: char) -> MenuAction {
    MenuAction::Repeat
}
fn end(_: char) -> MenuAction {
    MenuAction::End
}
fn accept(_: char) -> MenuAction {
    MenuAction::Accept
}
fn decline(_: char) -> MenuAction {
    MenuAction::Decline
}
fn back(_: char) -> MenuAction {
    MenuAction::Back
}
fn confirm(_: char) -> MenuAction {
    MenuAction::Confirm
}
fn cancel(_: char) -> MenuAction {
    MenuAction::Cancel
}

static JOB_MENU_KEYS: [KeyBinding; 3] = [
    bind(KeyPattern::Range('1', '8'), select),
    bind(KeyPattern::Key('9'), repeat),
    bind(KeyPattern::Key('*'), end),
];

static JOB_DETAIL_KEYS: [KeyBinding; 4] = [
    bind(KeyPattern::Key('1'), accept),
    bind(KeyPattern::Key('2'), decline),
    bind(KeyPattern::Key('9'), repeat),
    bind(KeyPattern::Key('*'), back),
];

static CONFIRM_KEYS: [KeyBinding; 3] = [
    bind(KeyPattern::Key('1'), confirm),
    bind(KeyPattern::Key('2'), cancel),
    bind(KeyPattern::Key('9'), repeat),
];

static JOB_MENU_WORDS: [(&str, ActionFn); 4] = [
    ("repeat", repeat),
    ("again", repeat),
    ("goodbye", end),
    ("done", end),
];

static JOB_DETAIL_WORDS: [(&str, ActionFn); 7] = [
    ("accept", accept),
    ("yes", accept),
    ("decline", decline),
    ("no", decline),
    ("repeat", repeat),
    ("again", repeat),
    ("back", back),
];

static CONFIRM_WORDS: [(&str, ActionFn); 6] = [
    ("confirm", confirm),
    ("yes", confirm),
    ("cancel", cancel),
    ("no", cancel),
    ("repeat", repeat),
    ("again", repeat),
];

fn key_table(phase: Phase) -> &'static [KeyBinding] {
    match phase {
        Phase::JobMenu => &JOB_MENU_KEYS,
        Phase::JobDetail => &JOB_DETAIL_KEYS,
        Phase::ConfirmAccept | Phase::ConfirmDecline => &CONFIRM_KEYS,
        _ => &[],
    }
}

fn word_table(phase: Phase) -> &'static [(&'static str, ActionFn)] {
    match phase {
        Phase::JobMenu => &JOB_MENU_WORDS,
        Phase::JobDetail => &JOB_DETAIL_WORDS,
        Phase::ConfirmAccept | Phase::ConfirmDecline => &CONFIRM_WORDS,
        _ => &[],
    }
}

/// Converts a spoken digit word to its key.
fn word_to_digit(word: &str) -> Option<char> {
    let digit = match word {
        "zero" => '0',
        "one" => '1',
        "two" => '2',
        "three" => '3',
        "four" => '4',
        "five" => '5',
        "six" => '6',
        "seven" => '7',
        "eight" => '8',
        "nine" => '9',
        _ => return None,
    };
    Some(digit)
}

/// Words recognizers return for a spoken digit that are also common words.
/// Only trusted when the whole utterance is digits.
fn homophone_to_digit(word: &str) -> Option<char> {
    match word {
        "oh" => Some('0'),
        "to" | "too" => Some('2'),
        "for" => Some('4'),
        _ => None,
    }
}

/// Lowercased words of a transcript with punctuation removed.
fn words(transcript: &str) -> Vec<String> {
    transcript
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect()
}

/// Digits spoken in a transcript, in order ("one 2 three" → "123").
///
/// "to", "for" and "oh" count as digits only when every word is a digit.
pub fn spoken_digits(transcript: &str) -> String {
    let spoken = words(transcript);
    let numeral = |word: &str| word.chars().all(|c| c.is_ascii_digit());
    let all_digits = spoken.iter().all(|word| {
        numeral(word) || word_to_digit(word).is_some() || homophone_to_digit(word).is_some()
    });

    let mut digits = String::new();
    for word in &spoken {
        if numeral(word) {
            digits.push_str(word);
        } else if let Some(digit) = word_to_digit(word) {
            digits.push(digit);
        } else if all_digits && let Some(digit) = homophone_to_digit(word) {
            digits.push(digit);
        }
    }
    digits
}

#[derive(Debug, Clone)]
pub struct DtmfRouter {
    config: FlowConfig,
}

impl DtmfRouter {
    pub fn new(config: FlowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Collection mode and timeout for an input phase, `None` otherwise.
    pub fn route_for(&self, phase: Phase) -> Option<PhaseRoute> {
        let (mode, timeout) = match phase {
            Phase::AwaitingIdentification => (
                DigitMode::Collect {
                    max_digits: self.config.pin_length,
                    finish_on: '#',
                },
                self.config.identification_timeout,
            ),
            Phase::JobMenu | Phase::JobDetail => {
                (DigitMode::SingleKey, self.config.menu_timeout)
            }
            Phase::ConfirmAccept | Phase::ConfirmDecline => {
                (DigitMode::SingleKey, self.config.confirm_timeout)
            }
            _ => return None,
        };
        Some(PhaseRoute { mode, timeout })
    }

    /// Maps caller input in `phase` to a menu action.
    pub fn route(&self, phase: Phase, event: &CallEvent) -> Routed {
        match event {
            CallEvent::Digits(digits) => self.route_digits(phase, digits),
            CallEvent::Speech {
                transcript,
                confidence,
            } => self.route_speech(phase, transcript, *confidence),
            _ => Routed::NotInput,
        }
    }

    fn route_digits(&self, phase: Phase, raw: &str) -> Routed {
        let keys: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        if keys.is_empty() {
            return Routed::Invalid("empty keypad input".to_string());
        }
        // "0" and "0#" both ask for a human.
        if keys.trim_end_matches('#') == ESCAPE_KEY.to_string() {
            return Routed::Action(MenuAction::Escape);
        }

        match self.route_for(phase).map(|route| route.mode) {
            Some(DigitMode::Collect { finish_on, .. }) => {
                let collected = keys.trim_end_matches(finish_on);
                if !collected.is_empty() && collected.chars().all(|c| c.is_ascii_digit()) {
                    Routed::Action(MenuAction::Pin(collected.to_string()))
                } else {
                    Routed::Invalid(format!("'{keys}' is not a PIN"))
                }
            }
            Some(DigitMode::SingleKey) => {
                let mut chars = keys.chars();
                match chars.next() {
                    // A leading 0 is still the escape key.
                    Some(ESCAPE_KEY) => Routed::Action(MenuAction::Escape),
                    Some(key) => self.dispatch_key(phase, key),
                    None => Routed::Invalid("empty keypad input".to_string()),
                }
            }
            None => Routed::Invalid(format!("no input expected in {phase}")),
        }
    }

    fn dispatch_key(&self, phase: Phase, key: char) -> Routed {
        key_table(phase)
            .iter()
            .find(|binding| binding.pattern.matches(key))
            .map(|binding| Routed::Action((binding.action)(key)))
            .unwrap_or_else(|| Routed::Invalid(format!("key '{key}' is not mapped in {phase}")))
    }

    fn route_speech(&self, phase: Phase, transcript: &str, confidence: f32) -> Routed {
        let spoken = words(transcript);
        if spoken.is_empty() || confidence < MIN_SPEECH_CONFIDENCE {
            return Routed::Invalid("unintelligible speech".to_string());
        }
        if spoken.iter().any(|word| ESCAPE_WORDS.contains(&word.as_str())) {
            return Routed::Action(MenuAction::Escape);
        }

        let digits = spoken_digits(transcript);
        if digits == ESCAPE_KEY.to_string() && spoken.len() == 1 {
            return Routed::Action(MenuAction::Escape);
        }

        match self.route_for(phase).map(|route| route.mode) {
            Some(DigitMode::Collect { .. }) => {
                if digits.is_empty() {
                    Routed::Invalid(format!("no digits in '{transcript}'"))
                } else {
                    Routed::Action(MenuAction::Pin(digits))
                }
            }
            Some(DigitMode::SingleKey) => {
                let keyword = word_table(phase)
                    .iter()
                    .find(|(keyword, _)| spoken.iter().any(|word| word == keyword));
                if let Some((_, action)) = keyword {
                    return Routed::Action(action(' '));
                }
                // A correction ("one, no, two") ends with the choice.
                match digits.chars().last() {
                    Some(ESCAPE_KEY) => Routed::Invalid(format!("'{transcript}' is ambiguous")),
                    Some(key) => self.dispatch_key(phase, key),
                    None => Routed::Invalid(format!("'{transcript}' is not a menu choice")),
                }
            }
            None => Routed::Invalid(format!("no input expected in {phase}")),
        }
    }
}
