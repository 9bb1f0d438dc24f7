//! # Voice callbacks
//!
//! Call-control webhooks answered with provider markup.
//!
//! | Route | Purpose |
//! |---|---|
//! | `POST /voice/incoming` | New call: connect the media stream, or start the gather flow |
//! | `POST /voice/gather` | Keypad / speech result (or timeout) for the gather flow |
//! | `POST /voice/transfer` | Read the transfer intent and dial the representative |
//! | `POST /voice/transfer/status` | Dial outcome; unanswered calls go to the hold queue |
//! | `POST /voice/hold` | Hold loop while the caller is queued |
//! | `POST /voice/status` | Call ended: release the session and any hold slot |

pub mod markup;
pub mod webhooks;

pub use markup::VoiceResponse;
pub use webhooks::{
    CallbackForm, call_status, gather_input, hold_loop, incoming_call, transfer_call,
    transfer_status,
};

pub const INCOMING_PATH: &str = "/voice/incoming";
pub const GATHER_PATH: &str = "/voice/gather";
pub const TRANSFER_PATH: &str = "/voice/transfer";
pub const TRANSFER_STATUS_PATH: &str = "/voice/transfer/status";
pub const HOLD_PATH: &str = "/voice/hold";
pub const STATUS_PATH: &str = "/voice/status";
