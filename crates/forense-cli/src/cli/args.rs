//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Forense - check images for signs of AI generation
#[derive(Parser, Debug)]
#[command(name = "forense")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start or resume a session and show its usage
    Status,

    /// Analyze one or more images
    Analyze {
        /// Image files to submit
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Manage your own Gemini API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Show usage of the current session
    Stats,

    /// Forget the local session (keeps your Gemini key)
    Logout,

    /// End the session on the server, then log out
    EndSession,
}

#[derive(Subcommand, Debug)]
pub enum KeyAction {
    /// Use your own key for analysis (prompts when omitted)
    Set {
        key: Option<String>,
    },

    /// Go back to the shared server key
    Clear,

    /// Show the configured key, masked
    Show,
}
