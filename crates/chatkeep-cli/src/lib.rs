// Library interface for chatkeep-cli so integration tests can reach the
// argument parser and renderers.

pub mod commands;

pub use commands::{render_log, run, Cli, Command};
