//! Turn orchestration: conversation state, the agent loop, and the
//! fragment stream it produces.

pub mod errors;
pub mod fragment;
pub mod history;
pub mod orchestrator;

pub use errors::TurnError;
pub use fragment::Fragment;
pub use history::Conversation;
pub use orchestrator::{run_turn, TurnLimits};
