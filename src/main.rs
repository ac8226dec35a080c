//! Board server binary.
//!
//! # Usage
//!
//! ```bash
//! board-collab-server [port]
//! PORT=9000 board-collab-server
//! ```
//!
//! Port resolution: CLI argument, then the `PORT` environment variable,
//! then 8080. Exits 0 on clean shutdown and 1 on a fatal bind or option
//! error.

use std::process::ExitCode;

use board_collab::server::{BoardServer, ServerConfig};

fn print_usage(program: &str) {
    eprintln!("Usage: {program} [port]");
    eprintln!("  port: port number to listen on (default: 8080)");
}

/// CLI arg > PORT env var > default 8080.
fn resolve_port(program: &str) -> Result<u16, ExitCode> {
    if let Some(arg) = std::env::args().nth(1) {
        if arg == "-h" || arg == "--help" {
            print_usage(program);
            return Err(ExitCode::SUCCESS);
        }
        return arg.parse().map_err(|_| {
            eprintln!("Invalid port number: {arg}");
            print_usage(program);
            ExitCode::FAILURE
        });
    }

    if let Ok(env_port) = std::env::var("PORT") {
        match env_port.parse() {
            Ok(port) => return Ok(port),
            Err(_) => log::warn!("invalid PORT env: {env_port}, using 8080"),
        }
    }

    Ok(8080)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let program = std::env::args()
        .next()
        .unwrap_or_else(|| "board-collab-server".to_string());
    let port = match resolve_port(&program) {
        Ok(port) => port,
        Err(code) => return code,
    };

    let config = ServerConfig {
        bind_addr: format!("0.0.0.0:{port}"),
        ..ServerConfig::default()
    };
    let server = BoardServer::new(config);

    log::info!("board-collab server v{} starting", env!("CARGO_PKG_VERSION"));

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                log::error!("fatal: {e}");
                eprintln!("Fatal error: {e}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("received shutdown signal, stopping");
            ExitCode::SUCCESS
        }
    }
}
