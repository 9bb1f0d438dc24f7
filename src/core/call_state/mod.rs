//! Versioned, TTL-bound call state shared by the media bridge and the
//! call-control callbacks.

pub mod session;
pub mod store;

pub use session::{CallSession, EscalationReason, Phase, TransferIntent};
pub use store::{CallStateStore, StoreError, Versioned, spawn_sweeper};
