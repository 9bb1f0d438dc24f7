//! Media-stream envelope types.
//!
//! Every message is a JSON object tagged by `event`. Inbound audio is base64
//! μ-law at 8 kHz in `media.payload`; outbound frames use the same shape.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, de};
use tracing::warn;

use crate::core::audio::TELEPHONY_SAMPLE_RATE;
use crate::core::bridge::{BridgeInput, BridgeOutput, StreamMode, StreamStart};

use super::error::MediaStreamError;

/// Custom stream parameter carrying the caller's number.
pub const CALLER_PARAMETER: &str = "caller";
/// Custom stream parameter selecting [`StreamMode`]; `hold` selects hold mode.
pub const MODE_PARAMETER: &str = "mode";

const MULAW_ENCODING: &str = "audio/x-mulaw";

/// Accepts both `"12"` and `12`.
fn flexible_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(value)) => Ok(Some(value)),
        Some(Raw::Text(text)) => text.parse().map(Some).map_err(de::Error::custom),
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    pub encoding: String,
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
}

fn default_channels() -> u16 {
    1
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload {
    pub call_sid: String,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
    #[serde(default)]
    pub media_format: Option<MediaFormat>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct InboundMedia {
    pub payload: String,
    /// Per-stream media chunk counter.
    #[serde(default, deserialize_with = "flexible_u64")]
    pub chunk: Option<u64>,
    #[serde(default, deserialize_with = "flexible_u64")]
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DtmfPayload {
    pub digit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarkPayload {
    pub name: String,
}

/// Events sent by the telephony provider.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum InboundMessage {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },
    Start {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        start: StartPayload,
    },
    Media {
        #[serde(rename = "sequenceNumber", default, deserialize_with = "flexible_u64")]
        sequence_number: Option<u64>,
        media: InboundMedia,
    },
    Dtmf {
        dtmf: DtmfPayload,
    },
    Mark {
        mark: MarkPayload,
    },
    Stop {},
}

impl InboundMessage {
    /// Converts the envelope into bridge input; `None` for informational events.
    pub fn into_input(self) -> Result<Option<BridgeInput>, MediaStreamError> {
        match self {
            InboundMessage::Connected { .. } => Ok(None),
            InboundMessage::Start { stream_sid, start } => {
                if let Some(format) = &start.media_format
                    && (format.encoding != MULAW_ENCODING
                        || format.sample_rate != TELEPHONY_SAMPLE_RATE)
                {
                    warn!(
                        stream_id = %stream_sid,
                        encoding = %format.encoding,
                        sample_rate = format.sample_rate,
                        "Unexpected media format, treating payloads as 8 kHz μ-law"
                    );
                }
                let mode = match start.custom_parameters.get(MODE_PARAMETER).map(String::as_str) {
                    Some("hold") => StreamMode::Hold,
                    _ => StreamMode::Conversation,
                };
                let caller_phone = start
                    .custom_parameters
                    .get(CALLER_PARAMETER)
                    .filter(|caller| !caller.is_empty())
                    .cloned();
                Ok(Some(BridgeInput::Start(StreamStart {
                    call_id: start.call_sid,
                    stream_id: stream_sid,
                    caller_phone,
                    mode,
                })))
            }
            InboundMessage::Media {
                sequence_number,
                media,
            } => {
                let sequence = media
                    .chunk
                    .or(sequence_number)
                    .ok_or(MediaStreamError::MissingSequence)?;
                let payload = BASE64
                    .decode(media.payload.as_bytes())
                    .map_err(|e| MediaStreamError::InvalidPayload(e.to_string()))?;
                if payload.is_empty() {
                    return Err(MediaStreamError::InvalidPayload("empty payload".to_string()));
                }
                Ok(Some(BridgeInput::Media {
                    sequence,
                    payload: Bytes::from(payload),
                }))
            }
            InboundMessage::Dtmf { dtmf } => {
                let mut chars = dtmf.digit.chars();
                match (chars.next(), chars.next()) {
                    (Some(key), None) if key.is_ascii_digit() || key == '*' || key == '#' => {
                        Ok(Some(BridgeInput::Dtmf(key)))
                    }
                    _ => Err(MediaStreamError::InvalidDigit(dtmf.digit)),
                }
            }
            InboundMessage::Mark { mark } => Ok(Some(BridgeInput::Mark(mark.name))),
            InboundMessage::Stop {} => Ok(Some(BridgeInput::Stop)),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutboundMedia {
    pub payload: String,
}

/// Events sent back to the telephony provider.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundMessage {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: MarkPayload,
    },
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

impl OutboundMessage {
    /// Envelope for a bridge output; `None` for [`BridgeOutput::Close`].
    pub fn from_output(stream_sid: &str, output: BridgeOutput) -> Option<Self> {
        let stream_sid = stream_sid.to_string();
        match output {
            BridgeOutput::Media(payload) => Some(OutboundMessage::Media {
                stream_sid,
                media: OutboundMedia {
                    payload: BASE64.encode(&payload),
                },
            }),
            BridgeOutput::Mark(name) => Some(OutboundMessage::Mark {
                stream_sid,
                mark: MarkPayload { name },
            }),
            BridgeOutput::Clear => Some(OutboundMessage::Clear { stream_sid }),
            BridgeOutput::Close => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> InboundMessage {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_start_reads_call_and_parameters() {
        let message = parse(json!({
            "event": "start",
            "sequenceNumber": "1",
            "streamSid": "MZ1",
            "start": {
                "accountSid": "AC1",
                "callSid": "CA1",
                "tracks": ["inbound"],
                "customParameters": {"caller": "+15551230000", "mode": "hold"},
                "mediaFormat": {"encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1}
            }
        }));
        let input = message.into_input().unwrap().unwrap();
        assert_eq!(
            input,
            BridgeInput::Start(StreamStart {
                call_id: "CA1".to_string(),
                stream_id: "MZ1".to_string(),
                caller_phone: Some("+15551230000".to_string()),
                mode: StreamMode::Hold,
            })
        );
    }

    #[test]
    fn test_media_prefers_chunk_counter() {
        let message = parse(json!({
            "event": "media",
            "sequenceNumber": "7",
            "streamSid": "MZ1",
            "media": {"track": "inbound", "chunk": "3", "timestamp": "60", "payload": "//8="}
        }));
        assert_eq!(
            message.into_input().unwrap(),
            Some(BridgeInput::Media {
                sequence: 3,
                payload: Bytes::from_static(&[0xFF, 0xFF]),
            })
        );
    }

    #[test]
    fn test_bad_payload_and_digit_are_rejected() {
        let media = parse(json!({
            "event": "media",
            "sequenceNumber": 2,
            "media": {"payload": "not base64!"}
        }));
        assert!(matches!(
            media.into_input(),
            Err(MediaStreamError::InvalidPayload(_))
        ));

        let dtmf = parse(json!({"event": "dtmf", "dtmf": {"digit": "12"}}));
        assert!(matches!(
            dtmf.into_input(),
            Err(MediaStreamError::InvalidDigit(_))
        ));
    }

    #[test]
    fn test_informational_and_control_events() {
        let connected = parse(json!({"event": "connected", "protocol": "Call", "version": "1.0.0"}));
        assert_eq!(connected.into_input().unwrap(), None);

        let stop = parse(json!({"event": "stop", "streamSid": "MZ1", "stop": {"callSid": "CA1"}}));
        assert_eq!(stop.into_input().unwrap(), Some(BridgeInput::Stop));

        let dtmf = parse(json!({"event": "dtmf", "dtmf": {"track": "inbound_track", "digit": "0"}}));
        assert_eq!(dtmf.into_input().unwrap(), Some(BridgeInput::Dtmf('0')));
    }

    #[test]
    fn test_unknown_event_fails_to_parse() {
        let result = serde_json::from_value::<InboundMessage>(json!({"event": "dance"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_outbound_envelopes() {
        let media = OutboundMessage::from_output("MZ1", BridgeOutput::Media(Bytes::from_static(&[0xFF])))
            .unwrap();
        assert_eq!(
            serde_json::to_value(&media).unwrap(),
            json!({"event": "media", "streamSid": "MZ1", "media": {"payload": "/w=="}})
        );

        let clear = OutboundMessage::from_output("MZ1", BridgeOutput::Clear).unwrap();
        assert_eq!(
            serde_json::to_value(&clear).unwrap(),
            json!({"event": "clear", "streamSid": "MZ1"})
        );

        assert!(OutboundMessage::from_output("MZ1", BridgeOutput::Close).is_none());
    }
}
