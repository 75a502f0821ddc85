//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Edge token authorizer - cookie-borne identity tokens checked against a cached key set
#[derive(Parser, Debug)]
#[command(name = "edge-authorizer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "EDGE_AUTH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "EDGE_AUTH_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "EDGE_AUTH_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to the edge simulator)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve a site directory behind the authorizer (default)
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory to serve
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Authorize one viewer-request event and print the response (null = allow)
    Check {
        /// Event JSON file; stdin when omitted or `-`
        event: Option<PathBuf>,
    },
}
