//! Edge Token Authorizer
//!
//! `serve` runs the local edge simulator; `check` authorizes a single
//! viewer-request event.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use edge_authorizer::{
    Authorizer,
    cli::{Cli, Command},
    config::Config,
    edge::EdgeEvent,
    server, setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Check { event }) => run_check(&config, event.as_deref()).await,
        Some(Command::Serve { host, port, root }) => run_server(config, host, port, root).await,
        None => run_server(config, None, None, None).await,
    }
}

/// Authorize one event and print the edge response (`null` on allow)
async fn run_check(config: &Config, event: Option<&Path>) -> ExitCode {
    let raw = match read_event(event) {
        Ok(raw) => raw,
        Err(e) => {
            error!("Failed to read event: {e}");
            return ExitCode::FAILURE;
        }
    };

    let event: EdgeEvent = match serde_json::from_str(&raw) {
        Ok(event) => event,
        Err(e) => {
            error!("Invalid event JSON: {e}");
            return ExitCode::FAILURE;
        }
    };

    let authorizer = match Authorizer::from_config(config) {
        Ok(a) => a,
        Err(e) => {
            error!("Failed to create authorizer: {e}");
            return ExitCode::FAILURE;
        }
    };

    let response = authorizer.handle_event(&event).await;
    match serde_json::to_string_pretty(&response) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize response: {e}");
            ExitCode::FAILURE
        }
    }
}

fn read_event(path: Option<&Path>) -> std::io::Result<String> {
    match path {
        Some(p) if p != Path::new("-") => std::fs::read_to_string(p),
        _ => {
            let mut raw = String::new();
            std::io::stdin().read_to_string(&mut raw)?;
            Ok(raw)
        }
    }
}

/// Run the edge simulator
async fn run_server(
    mut config: Config,
    host: Option<String>,
    port: Option<u16>,
    root: Option<PathBuf>,
) -> ExitCode {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(root) = root {
        config.server.root = root;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        key_set = %config.key_set.url,
        cookie = %config.authorizer.cookie_name,
        "Starting edge authorizer"
    );

    let authorizer = match Authorizer::from_config(&config) {
        Ok(a) => Arc::new(a),
        Err(e) => {
            error!("Failed to create authorizer: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server::run(&config.server, authorizer).await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
