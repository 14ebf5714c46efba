//! Production implementations of the collaborator ports.
//!
//! - [`CommandReasoner`] and [`CommandExecutor`] drive an external agent
//!   command (default `claude --print --output-format json`)
//! - [`TerminalHuman`] prompts interactively, [`DeferringHuman`] never blocks

mod agent;
mod command;
mod terminal;

pub use agent::{AgentCommand, AgentReply, parse_reply};
pub use command::{CommandExecutor, CommandReasoner};
pub use terminal::{DeferringHuman, TerminalHuman};
