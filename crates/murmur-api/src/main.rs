//! murmur relay entry point.
//!
//! Binary name: `murmur`
//!
//! Parses CLI arguments, initializes tracing, the message store and the
//! broadcast engine, then dispatches to the appropriate command handler or
//! starts the WebSocket/REST server.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use murmur_observe::tracing_setup::{LogFormat, init_tracing, shutdown_tracing};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need tracing or app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "murmur", &mut std::io::stdout());
        return Ok(());
    }

    let serving = matches!(cli.command, Commands::Serve { .. });

    // Set up tracing based on verbosity. The server logs at info by default.
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 if serving => "info",
        0 => "warn",
        1 => "info,murmur=debug",
        _ => "trace",
    };
    let (format, otel) = match &cli.command {
        Commands::Serve { log_json, otel, .. } => (
            if *log_json { LogFormat::Json } else { LogFormat::Text },
            *otel,
        ),
        _ => (LogFormat::Text, false),
    };
    init_tracing(filter, format, otel).map_err(|e| anyhow::anyhow!("{e}"))?;

    let ephemeral = matches!(cli.command, Commands::Serve { ephemeral: true, .. });
    let state = AppState::init(ephemeral).await?;

    let result = run(cli, state).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli, state: AppState) -> anyhow::Result<()> {
    match cli.command {
        Commands::History { limit } => {
            cli::history::show_history(&state, limit, cli.json).await?;
        }

        Commands::Status => {
            cli::status::status(&state, cli.json).await?;
        }

        Commands::Serve { port, host, .. } => {
            let host = host.unwrap_or_else(|| state.config.host.clone());
            let port = port.unwrap_or(state.config.port);

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!(%addr, durable = state.engine.store().is_durable(), "relay listening");

            if !cli.quiet {
                println!();
                println!(
                    "  {} murmur listening on {}",
                    console::style("⚡").bold(),
                    console::style(format!("http://{addr}")).cyan()
                );
                println!(
                    "  {}",
                    console::style(format!("WebSocket: ws://{addr}/ws")).dim()
                );
                println!("  {}", console::style("Press Ctrl+C to stop").dim());
                println!();
            }

            let router = http::router::build_router(state);
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            if !cli.quiet {
                println!("\n  Server stopped.");
            }
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
