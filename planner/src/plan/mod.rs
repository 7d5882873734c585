//! Plan compilation: stage builders, the protocol state machine, and the
//! compiler entry point.

mod builder;
pub mod compiler;
pub mod stage_machine;
mod stages;

pub use compiler::TransferPlanner;
pub use stage_machine::{ProtocolMachine, ProtocolState, TransitionRecord};
