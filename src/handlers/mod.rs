//! HTTP and WebSocket request handlers
//!
//! This module organizes all handlers into logical groups:
//! - `api` - Health check endpoint
//! - `media` - Media-stream WebSocket carrying call audio
//! - `queue` - Hold-queue inspection and dequeue for representatives
//! - `voice` - Call-control callbacks answered with provider markup

pub mod api;
pub mod media;
pub mod queue;
pub mod voice;

// Re-export commonly used handlers for convenient access
pub use media::media_stream_handler;
