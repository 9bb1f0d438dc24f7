//! # Media stream
//!
//! WebSocket endpoint (`/media`) carrying the telephony provider's media
//! stream for one call.
//!
//! **Inbound events** (`event` field): `connected`, `start`, `media`, `dtmf`,
//! `mark`, `stop`.
//!
//! **Outbound events**: `media` (20 ms base64 μ-law frames), `mark` (after a
//! prompt finished playing), `clear` (flush provider-side audio).
//!
//! Custom parameters on `start`: `caller` (caller-id) and `mode` (`hold` for
//! a queued caller; anything else runs the conversation).

pub mod error;
pub mod handler;
pub mod messages;

pub use error::MediaStreamError;
pub use handler::media_stream_handler;
pub use messages::{CALLER_PARAMETER, InboundMessage, MODE_PARAMETER, OutboundMessage};
