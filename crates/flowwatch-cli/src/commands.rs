//! CLI command definitions.

use clap::{Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Watch every configured CI server and serve the status API
    Serve {
        /// Override the API bind address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Load a flow definition file and report unresolved flows
    Validate {
        /// Path to the flow definition file
        path: PathBuf,
    },

    /// Print a flow's jobs in render order with their predecessors
    Map {
        /// Path to the flow definition file
        path: PathBuf,

        /// Flow name
        flow: String,
    },

    /// Classify a build and print its upstream chain
    Inspect {
        /// Configured server to query
        #[arg(short, long)]
        server: String,

        /// Job or flow name
        job: String,

        /// Build number
        build: u64,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
