//! CLI argument models for the `braid` binary.
//!
//! Exposes the clap-backed `Cli` with its subcommands, `ValueEnum` option
//! types converting into core types, and shell completion rendering.

pub mod cli_args;
pub mod cli_types;
pub mod shell_completion;

pub use cli_args::{BraidCommand, Cli, HeadCommand, LogArgs};
pub use cli_types::*;
pub use shell_completion::*;
