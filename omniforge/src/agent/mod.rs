//! The autonomous agent driver: bounded ReAct loop, reply parsing, and
//! the background-worker plumbing around one task execution.

mod driver;
mod parser;

pub use driver::{AutonomousDriver, DriverConfig, TaskHandle};
pub use parser::{ReactReply, parse_react_reply};
