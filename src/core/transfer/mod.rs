//! Live-representative transfer and the shared hold queue.

pub mod hold_queue;
pub mod manager;

pub use hold_queue::{HoldQueue, QueueEntry};
pub use manager::{
    DialStatus, TransferConfig, TransferError, TransferInstruction, TransferManager,
};
