//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Developer activity sessionizer.
///
/// Orders, deduplicates and splits raw activity events from editors,
/// terminals and AI assistants into deterministic work sessions.
#[derive(Debug, Parser)]
#[command(name = "stint", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Replay JSONL events through the pipeline and print sessions.
    Process {
        /// Event files to read. Reads stdin when none are given.
        files: Vec<PathBuf>,

        /// Print a human-readable summary instead of JSONL sessions.
        #[arg(long)]
        summary: bool,
    },

    /// Re-derive session fingerprints and check them against the recorded ones.
    Verify {
        /// JSONL sessions file. Reads stdin when omitted.
        file: Option<PathBuf>,
    },

    /// Show the effective pipeline configuration.
    Config,
}
