//! CLI subcommand implementations.

pub mod config;
pub mod process;
pub mod verify;
