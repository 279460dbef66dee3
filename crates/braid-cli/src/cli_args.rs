use std::path::PathBuf;

use clap::builder::FalseyValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::Value;

use crate::{CliConversationSort, CliShellCompletion};

fn parse_non_empty(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("value must not be empty".to_string());
    }
    Ok(trimmed.to_string())
}

/// Parses `key=value`; the value is read as JSON and falls back to a plain
/// string.
fn parse_option_pair(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("option key must not be empty in '{raw}'"));
    }
    let value = serde_json::from_str::<Value>(value.trim())
        .unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[derive(Debug, Parser)]
#[command(
    name = "braid",
    about = "Git-like branching for a prompt/response conversation log",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "BRAID_DB",
        default_value = ".braid/logs.db",
        global = true,
        hide_env_values = true,
        help = "SQLite log database; parent directories are created on open"
    )]
    pub db: PathBuf,

    #[arg(
        long = "no-color",
        env = "BRAID_NO_COLOR",
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new(),
        global = true,
        help = "Disable ANSI colour in terminal output"
    )]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: BraidCommand,
}

#[derive(Debug, Subcommand)]
pub enum BraidCommand {
    /// Record a prompt/response exchange and move the head to it.
    Log(LogArgs),
    /// Inspect and move the head pointer.
    Head {
        #[command(subcommand)]
        command: Option<HeadCommand>,
    },
    /// Print a conversation's active chain as JSON.
    Export {
        /// Listing number (see `head list`) or conversation id.
        identifier: Option<String>,
    },
    /// Print a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: CliShellCompletion,
    },
}

#[derive(Debug, Clone, Args)]
pub struct LogArgs {
    #[arg(long, value_parser = parse_non_empty)]
    pub model: String,

    #[arg(long, default_value = "")]
    pub prompt: String,

    #[arg(long)]
    pub response: String,

    #[arg(long)]
    pub system: Option<String>,

    #[arg(
        long,
        value_parser = parse_non_empty,
        help = "Continue this conversation instead of starting a new one"
    )]
    pub conversation: Option<String>,

    #[arg(
        long,
        value_parser = parse_non_empty,
        help = "Branch from this response instead of the newest one"
    )]
    pub parent: Option<String>,

    #[arg(
        long = "option",
        value_name = "KEY=VALUE",
        value_parser = parse_option_pair,
        help = "Model option recorded with the response; repeatable"
    )]
    pub options: Vec<(String, Value)>,

    #[arg(long = "input-tokens")]
    pub input_tokens: Option<u64>,

    #[arg(long = "output-tokens")]
    pub output_tokens: Option<u64>,

    #[arg(long = "duration-ms")]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum HeadCommand {
    /// Show the response the head points at.
    Show,
    /// Move the head to a response.
    Set { response_id: String },
    /// Move the head to the parent of the current response.
    Back,
    /// Link legacy responses to their chronological predecessors.
    Populate,
    /// Print a conversation; defaults to the one holding the head.
    Print {
        /// Listing number (see `head list`) or conversation id.
        identifier: Option<String>,
    },
    /// List conversations with their response counts.
    List {
        #[arg(long, value_enum, default_value_t = CliConversationSort::Time)]
        sort: CliConversationSort,
    },
}
