pub mod audio;
pub mod bridge;
pub mod cache;
pub mod call_control;
pub mod call_state;
pub mod conversation;
pub mod directory;
pub mod speech;
pub mod transfer;

// Re-export commonly used types for convenience
pub use bridge::{BridgeConfig, BridgeDeps, BridgeError, MediaBridge};
pub use call_state::{CallSession, CallStateStore, Phase};
pub use conversation::{CallDriver, CallEvent, ConversationFsm, Directive, Prompt};
pub use transfer::{HoldQueue, TransferManager};
