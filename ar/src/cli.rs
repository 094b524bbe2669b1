//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// agentrun - submit agent runs and follow their events
#[derive(Parser)]
#[command(
    name = "ar",
    about = "Submit agent runs and follow their event streams",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit a run and stream its events until it finishes
    Run {
        /// Agent to run
        #[arg(short, long, default_value = "default")]
        agent: String,

        /// Task instructions for the agent
        #[arg(short, long)]
        instructions: String,

        /// Local file to upload and attach (repeatable)
        #[arg(short, long = "file", value_name = "PATH")]
        files: Vec<PathBuf>,

        /// Link to attach (repeatable)
        #[arg(long = "link", value_name = "URL")]
        links: Vec<String>,

        /// Free-form notes for the agent
        #[arg(short, long)]
        notes: Option<String>,

        /// Integration to enable (repeatable)
        #[arg(long = "integration", value_name = "NAME")]
        integrations: Vec<String>,

        /// Execution mode hint
        #[arg(short, long)]
        mode: Option<String>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// Do not record events to the run history
        #[arg(long)]
        no_history: bool,
    },

    /// Upload a file for use as a run input
    Upload {
        /// File to upload
        path: PathBuf,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// List recorded runs, or replay one run's events
    History {
        /// Run to replay
        run_id: Option<String>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for command results
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => {
                debug!(%s, "OutputFormat::from_str: unknown format");
                Err(format!("Unknown format: {}. Use: text or json", s))
            }
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agentrun")
        .join("logs")
        .join("agentrun.log")
}
