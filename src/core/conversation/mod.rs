//! Spoken job-menu conversation.
//!
//! - `router`: phase-scoped keypad/speech dispatch tables (DTMFRouter)
//! - `fsm`: the pure transition function
//! - `driver`: runs transitions against the call state store and executes effects
//! - `events`, `prompts`: the vocabulary shared by all of the above

pub mod driver;
pub mod events;
pub mod fsm;
pub mod prompts;
pub mod router;

pub use driver::{CallDriver, CollectingSink, Directive, DirectiveSink, DriveOutcome, DriverError};
pub use events::{CallEvent, DataRequest, Effect};
pub use fsm::{ConversationFsm, Transition};
pub use prompts::Prompt;
pub use router::{DigitMode, DtmfRouter, FlowConfig, MenuAction, Routed};
