//! The terminal that agent actions and the "run terminal command" command
//! write into.

mod subprocess;
pub use subprocess::{OutputSink, ShellTerminal};
