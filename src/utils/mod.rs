//! Shared helpers: logging setup and the terminal restore guard.

pub mod guard;
pub mod logger;
