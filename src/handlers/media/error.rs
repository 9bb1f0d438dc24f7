//! Media-stream protocol errors.
//!
//! All of these are per-message: the offending envelope is dropped and the
//! stream carries on.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MediaStreamError {
    #[error("Malformed media envelope: {0}")]
    InvalidMessage(String),

    #[error("Invalid media payload: {0}")]
    InvalidPayload(String),

    #[error("Media frame without a sequence number")]
    MissingSequence,

    #[error("Invalid DTMF digit: {0:?}")]
    InvalidDigit(String),

    #[error("Unexpected binary frame ({0} bytes)")]
    UnexpectedBinary(usize),
}

impl From<serde_json::Error> for MediaStreamError {
    fn from(err: serde_json::Error) -> Self {
        MediaStreamError::InvalidMessage(err.to_string())
    }
}
